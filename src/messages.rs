//! Wire-level messages shared with routers and workers
//!
//! Requests arrive as JSON documents packed by the upstream router; task
//! descriptors handed to workers are MessagePack, which is what the worker
//! and client side of the pipeline speak. The planner only reads and writes
//! the fields documented here and treats the rest of the schema as opaque.

use crate::error::{PlanError, Result};
use crate::geometry::FragmentId;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

fn pack_named<T: Serialize>(value: &T) -> Result<Bytes> {
    let mut buf = BytesMut::new().writer();
    rmp_serde::encode::write_named(&mut buf, value)?;
    Ok(buf.into_inner().freeze())
}

fn unpack_json<'a, T: Deserialize<'a>>(doc: &'a [u8]) -> Result<T> {
    serde_json::from_slice(doc).map_err(|e| PlanError::MalformedMessage(e.to_string()))
}

fn pack_json<T: Serialize>(value: &T) -> Result<Bytes> {
    let buf = serde_json::to_vec(value).map_err(|e| PlanError::MalformedMessage(e.to_string()))?;
    Ok(Bytes::from(buf))
}

/// A slice request, as packed by the upstream router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceTask {
    /// Process id of the request, passed through unchanged
    pub pid: String,
    /// Credential forwarded to workers, passed through unchanged
    pub token: String,
    /// Cube id in the blob store, passed through unchanged
    pub guid: String,
    /// Blob store the fragments live in, passed through unchanged
    pub storage_endpoint: String,
    /// The requested operation; always "slice" for this message
    pub function: String,
    /// The manifest document for the cube, embedded as a string
    pub manifest: String,
    /// Fragment extent along each axis
    pub shape: [usize; 3],
    /// The axis the slice is perpendicular to
    pub dim: usize,
    /// The requested line, a coordinate label and not an index
    pub lineno: i64,
}

impl SliceTask {
    pub fn unpack(doc: &[u8]) -> Result<Self> {
        unpack_json(doc)
    }

    pub fn pack(&self) -> Result<Bytes> {
        pack_json(self)
    }
}

/// A slice task descriptor, consumed by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceFetch {
    pub pid: String,
    pub token: String,
    pub guid: String,
    pub storage_endpoint: String,
    pub function: String,
    /// Fragment extent, echoed from the task
    pub shape: [usize; 3],
    /// Total cube extent, derived from the manifest
    pub shape_cube: [usize; 3],
    /// The axis the slice is perpendicular to, echoed from the task
    pub dim: usize,
    /// Offset of the slice within a fragment along `dim`; unlike the task's
    /// `lineno` this is a fragment-local index, not a line label
    pub lineno: usize,
    /// The fragments to fetch, in order
    pub ids: Vec<FragmentId>,
}

impl SliceFetch {
    pub fn unpack(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::decode::from_slice(data)?)
    }

    pub fn pack(&self) -> Result<Bytes> {
        pack_named(self)
    }
}

/// A curtain request, as packed by the upstream router
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurtainTask {
    pub pid: String,
    pub token: String,
    pub guid: String,
    pub storage_endpoint: String,
    /// The requested operation; always "curtain" for this message
    pub function: String,
    pub manifest: String,
    pub shape: [usize; 3],
    /// Dim-0 coordinates of the requested columns; paired with `dim1s`
    pub dim0s: Vec<usize>,
    /// Dim-1 coordinates of the requested columns; paired with `dim0s`
    pub dim1s: Vec<usize>,
}

impl CurtainTask {
    pub fn unpack(doc: &[u8]) -> Result<Self> {
        unpack_json(doc)
    }

    pub fn pack(&self) -> Result<Bytes> {
        pack_json(self)
    }
}

/// One fragment to fetch for a curtain, and where to read it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleFetch {
    pub id: FragmentId,
    /// Fragment-local (dim0, dim1) pairs to pull whole vertical columns
    /// from. Duplicate input points stay duplicated; workers rely on the
    /// multiplicity.
    pub coordinates: Vec<[usize; 2]>,
}

/// A curtain task descriptor, consumed by a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurtainFetch {
    pub pid: String,
    pub token: String,
    pub guid: String,
    pub storage_endpoint: String,
    pub function: String,
    pub shape: [usize; 3],
    pub shape_cube: [usize; 3],
    /// The fragments to fetch, lexicographically sorted, each id at most
    /// once
    pub ids: Vec<SingleFetch>,
}

impl CurtainFetch {
    pub fn unpack(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::decode::from_slice(data)?)
    }

    pub fn pack(&self) -> Result<Bytes> {
        pack_named(self)
    }
}

/// Per-process accounting record, read by result assembly downstream
///
/// Result collection refuses to start on a header with `ntasks < 1`, which
/// is why a plan always carries at least one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessHeader {
    pub pid: String,
    /// Number of task descriptors emitted for this process
    pub ntasks: usize,
    /// Extent of the assembled result along each of its axes
    pub shape: Vec<usize>,
    /// Coordinate labels along each result axis
    pub index: Vec<Vec<i64>>,
}

impl ProcessHeader {
    /// Unpack a header document
    pub fn unpack(doc: &[u8]) -> Result<Self> {
        unpack_json(doc)
    }

    /// Pack into a header document; the result is JSON, stored downstream
    /// as `<pid>/header.json`
    pub fn pack(&self) -> Result<Bytes> {
        pack_json(self)
    }
}
