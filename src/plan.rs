//! Request planning - from a packed request document to a set of worker tasks
//!
//! Planning means:
//!
//! 1. parse an incoming request, e.g. slice along dim 0 at some line
//! 2. build the full set of task descriptions (fragment ids + what to
//!    extract from each fragment)
//! 3. split the set into units of work of at most `task_size` fragments
//!
//! Sending the units to worker nodes is outside this scope. The high-level
//! algorithm is independent of the request shape; only the build step
//! differs between slices and curtains, so the partitioning is generic over
//! the [`TaskPlan`] trait and shared by every request kind.

use crate::error::{PlanError, Result};
use crate::geometry::{Dimension, FragmentId, Grid};
use crate::manifest::Manifest;
use crate::messages::{
    CurtainFetch, CurtainTask, ProcessHeader, SingleFetch, SliceFetch, SliceTask,
};
use bytes::Bytes;
use serde::Deserialize;
use std::mem;
use tracing::debug;

/// A fetch plan the partitioner can split: anything with a mutable fragment
/// list and a pack operation
pub trait TaskPlan {
    /// Fragment entry type; bare ids for slices, id plus coordinates for
    /// curtains
    type Id: Clone;

    fn take_ids(&mut self) -> Vec<Self::Id>;

    fn set_ids(&mut self, ids: Vec<Self::Id>);

    fn pack(&self) -> Result<Bytes>;
}

impl TaskPlan for SliceFetch {
    type Id = FragmentId;

    fn take_ids(&mut self) -> Vec<FragmentId> {
        mem::take(&mut self.ids)
    }

    fn set_ids(&mut self, ids: Vec<FragmentId>) {
        self.ids = ids;
    }

    fn pack(&self) -> Result<Bytes> {
        SliceFetch::pack(self)
    }
}

impl TaskPlan for CurtainFetch {
    type Id = SingleFetch;

    fn take_ids(&mut self) -> Vec<SingleFetch> {
        mem::take(&mut self.ids)
    }

    fn set_ids(&mut self, ids: Vec<SingleFetch>) {
        self.ids = ids;
    }

    fn pack(&self) -> Result<Bytes> {
        CurtainFetch::pack(self)
    }
}

/// Number of task-size'd tasks needed to process all jobs
fn task_count(jobs: usize, task_size: usize) -> Result<usize> {
    let count = jobs
        .checked_add(task_size - 1)
        .ok_or(PlanError::IntegerOverflow)?
        / task_size;
    Ok(count)
}

/// Split a fetch plan into packed tasks of at most `task_size` fragments
///
/// Only the fragment list differs between the emitted tasks; the routing
/// fields and shapes repeat in every one, and concatenating the chunks
/// restores the plan's fragment list in order. An empty plan still packs a
/// single task, so downstream accounting always sees at least one unit of
/// work per process.
pub fn partition<P: TaskPlan>(plan: &mut P, task_size: usize) -> Result<Vec<Bytes>> {
    if task_size < 1 {
        return Err(PlanError::InvalidTaskSize(task_size));
    }

    let ids = plan.take_ids();
    if ids.is_empty() {
        return Ok(vec![plan.pack()?]);
    }

    let ntasks = task_count(ids.len(), task_size)?;
    let mut packed = Vec::with_capacity(ntasks);
    for chunk in ids.chunks(task_size) {
        plan.set_ids(chunk.to_vec());
        packed.push(plan.pack()?);
    }

    Ok(packed)
}

/// Build the fetch plan for a slice request
///
/// The task's `lineno` is a line label; its position in the manifest index
/// both selects the fragment row to fetch and, modulo the fragment extent,
/// tells the worker where the slice sits inside each fragment.
pub fn build_slice(task: &SliceTask, manifest: &Manifest) -> Result<SliceFetch> {
    let dim = Dimension::from_index(task.dim).ok_or(PlanError::InvalidAxis(task.dim))?;
    let pin = manifest.position_of(dim, task.lineno)?;
    let grid = Grid::new(manifest.cube_shape(), task.shape)?;

    Ok(SliceFetch {
        pid: task.pid.clone(),
        token: task.token.clone(),
        guid: task.guid.clone(),
        storage_endpoint: task.storage_endpoint.clone(),
        function: task.function.clone(),
        shape: task.shape,
        shape_cube: manifest.cube_shape(),
        dim: task.dim,
        lineno: pin % grid.fragment_shape()[task.dim],
        ids: grid.slice(dim, pin),
    })
}

/// Build the fetch plan for a curtain request
///
/// Every requested (x, y) pair names a full vertical column, so each pair
/// pulls in the whole z-run of fragments below its top fragment. The
/// fragment list stays lexicographically sorted throughout: a column is
/// inserted as one contiguous run of ids, and ids with fixed (x, y) and
/// increasing z are consecutive in the sort order.
///
/// Points are not validated against the cube extent; a point past the edge
/// bins into a fragment past the grid, garbage in, garbage out.
pub fn build_curtain(task: &CurtainTask, manifest: &Manifest) -> Result<CurtainFetch> {
    if task.dim0s.len() != task.dim1s.len() {
        return Err(PlanError::MalformedCurtain {
            dim0s: task.dim0s.len(),
            dim1s: task.dim1s.len(),
        });
    }

    let grid = Grid::new(manifest.cube_shape(), task.shape)?;
    let zfrags = grid.fragment_count(Dimension::Dim2);
    let fragment_shape = grid.fragment_shape();

    // Guess the number of coordinates per fragment. A plane going through
    // the fragment, with a little margin, is a reasonable assumption; the
    // vectors are short-lived, so overestimating slightly is fine.
    let approx_coordinates_per_fragment =
        (fragment_shape[0].max(fragment_shape[1]) as f64 * 1.2) as usize;

    let mut ids: Vec<SingleFetch> = Vec::new();

    // First pass: construct the bins. Many (x, y) pairs land in the same
    // fragment, so the skeleton is the set of distinct columns, each
    // expanded to its full z-run up front.
    for (&x, &y) in task.dim0s.iter().zip(&task.dim1s) {
        let fid = grid.frag_id([x, y, 0]);
        if let Err(pos) = ids.binary_search_by(|single| single.id.cmp(&fid)) {
            let [i0, i1, _] = fid.0;
            let column = (0..zfrags).map(|z| SingleFetch {
                id: FragmentId::new(i0, i1, z),
                coordinates: Vec::with_capacity(approx_coordinates_per_fragment),
            });
            ids.splice(pos..pos, column);
        }
    }

    // Second pass: traverse the (x, y) pairs again and bin them. Every
    // fragment in a column receives the same local pair, duplicates
    // included.
    for (&x, &y) in task.dim0s.iter().zip(&task.dim1s) {
        let top = [x, y, 0];
        let fid = grid.frag_id(top);
        let local = grid.to_local(top);
        let pos = ids
            .binary_search_by(|single| single.id.cmp(&fid))
            .unwrap_or_else(|pos| pos);
        for single in &mut ids[pos..pos + zfrags] {
            single.coordinates.push([local[0], local[1]]);
        }
    }

    Ok(CurtainFetch {
        pid: task.pid.clone(),
        token: task.token.clone(),
        guid: task.guid.clone(),
        storage_endpoint: task.storage_endpoint.clone(),
        function: task.function.clone(),
        shape: task.shape,
        shape_cube: manifest.cube_shape(),
        ids,
    })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    function: String,
}

/// The complete output of planning one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Accounting record consumed by result assembly
    pub header: ProcessHeader,
    /// Packed task descriptors, in order
    pub tasks: Vec<Bytes>,
}

/// Plan a request: parse the envelope, build the fetch plan for its kind,
/// partition into packed tasks
pub fn plan(doc: &[u8], task_size: usize) -> Result<Plan> {
    let envelope: Envelope =
        serde_json::from_slice(doc).map_err(|e| PlanError::MalformedMessage(e.to_string()))?;

    debug!(function = %envelope.function, task_size, "planning request");

    match envelope.function.as_str() {
        "slice" => slice_plan(doc, task_size),
        "curtain" => curtain_plan(doc, task_size),
        _ => Err(PlanError::UnknownFunction(envelope.function)),
    }
}

/// Plan a request, returning only the packed task descriptors
pub fn mkschedule(doc: &[u8], task_size: usize) -> Result<Vec<Bytes>> {
    Ok(plan(doc, task_size)?.tasks)
}

fn slice_plan(doc: &[u8], task_size: usize) -> Result<Plan> {
    let task = SliceTask::unpack(doc)?;
    let manifest = Manifest::parse(&task.manifest)?;
    let mut fetch = build_slice(&task, &manifest)?;
    let tasks = partition(&mut fetch, task_size)?;
    let header = slice_header(&task, &manifest, tasks.len());

    debug!(pid = %task.pid, ntasks = tasks.len(), "slice plan ready");
    Ok(Plan { header, tasks })
}

fn curtain_plan(doc: &[u8], task_size: usize) -> Result<Plan> {
    let task = CurtainTask::unpack(doc)?;
    let manifest = Manifest::parse(&task.manifest)?;
    let mut fetch = build_curtain(&task, &manifest)?;
    let tasks = partition(&mut fetch, task_size)?;
    let header = curtain_header(&task, &manifest, tasks.len());

    debug!(pid = %task.pid, ntasks = tasks.len(), "curtain plan ready");
    Ok(Plan { header, tasks })
}

/// The result of a slice keeps the two cube axes the slice does not cut, in
/// natural order
fn slice_header(task: &SliceTask, manifest: &Manifest, ntasks: usize) -> ProcessHeader {
    let (a, b) = match task.dim {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };

    ProcessHeader {
        pid: task.pid.clone(),
        ntasks,
        shape: vec![manifest.dimensions[a].len(), manifest.dimensions[b].len()],
        index: vec![manifest.dimensions[a].clone(), manifest.dimensions[b].clone()],
    }
}

/// A curtain result is one column per requested point. Point labels are the
/// client's to derive from its own query; the header carries point ordinals
/// and the vertical axis labels.
fn curtain_header(task: &CurtainTask, manifest: &Manifest, ntasks: usize) -> ProcessHeader {
    let npoints = task.dim0s.len();

    ProcessHeader {
        pid: task.pid.clone(),
        ntasks,
        shape: vec![npoints, manifest.dimensions[2].len()],
        index: vec![
            (0..npoints as i64).collect(),
            manifest.dimensions[2].clone(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_manifest() -> Manifest {
        Manifest {
            dimensions: vec![
                (100..109).collect(),
                (200..215).collect(),
                (0..23).map(|z| z * 4).collect(),
            ],
        }
    }

    fn slice_task(dim: usize, lineno: i64) -> SliceTask {
        SliceTask {
            pid: "c7bd6f74".to_string(),
            token: "...".to_string(),
            guid: "0d235a71".to_string(),
            storage_endpoint: "https://acc.blob.core.windows.net".to_string(),
            function: "slice".to_string(),
            manifest: String::new(),
            shape: [3, 9, 5],
            dim,
            lineno,
        }
    }

    fn curtain_task(dim0s: Vec<usize>, dim1s: Vec<usize>) -> CurtainTask {
        CurtainTask {
            pid: "c7bd6f74".to_string(),
            token: "...".to_string(),
            guid: "0d235a71".to_string(),
            storage_endpoint: "https://acc.blob.core.windows.net".to_string(),
            function: "curtain".to_string(),
            manifest: String::new(),
            shape: [3, 3, 3],
            dim0s,
            dim1s,
        }
    }

    #[test]
    fn test_build_slice_crossline() {
        // cube (9, 15, 23), fragments (3, 9, 5); label 211 sits at pin 11
        let fetch = build_slice(&slice_task(1, 211), &test_manifest()).unwrap();

        assert_eq!(fetch.shape_cube, [9, 15, 23]);
        assert_eq!(fetch.dim, 1);
        assert_eq!(fetch.lineno, 11 % 9);
        assert_eq!(fetch.ids.len(), 3 * 5);
        for (id, expected0) in fetch.ids.iter().zip([0, 0, 0, 0, 0, 1, 1, 1, 1, 1, 2, 2, 2, 2, 2])
        {
            assert_eq!(id.0[0], expected0);
            assert_eq!(id.0[1], 1);
        }
    }

    #[test]
    fn test_build_slice_unknown_line() {
        let err = build_slice(&slice_task(1, 199), &test_manifest()).unwrap_err();
        assert!(matches!(err, PlanError::LineNotFound { line: 199, dim: 1 }));
    }

    #[test]
    fn test_build_slice_bad_dim() {
        let err = build_slice(&slice_task(3, 211), &test_manifest()).unwrap_err();
        assert!(matches!(err, PlanError::InvalidAxis(3)));
    }

    fn curtain_manifest() -> Manifest {
        Manifest {
            dimensions: vec![
                (0..6).collect(),
                (0..6).collect(),
                (0..6).collect(),
            ],
        }
    }

    #[test]
    fn test_build_curtain_suppresses_duplicate_fragments() {
        // cube (6, 6, 6), fragments (3, 3, 3): two points share a column
        let task = curtain_task(vec![0, 0, 4], vec![0, 0, 4]);
        let fetch = build_curtain(&task, &curtain_manifest()).unwrap();

        let expected_ids = [[0, 0, 0], [0, 0, 1], [1, 1, 0], [1, 1, 1]];
        assert_eq!(fetch.ids.len(), 4);
        for (single, expected) in fetch.ids.iter().zip(expected_ids) {
            assert_eq!(single.id, FragmentId(expected));
        }

        // duplicate points keep their multiplicity in every record of the
        // column
        for single in &fetch.ids[..2] {
            assert_eq!(single.coordinates, vec![[0, 0], [0, 0]]);
        }
        for single in &fetch.ids[2..] {
            assert_eq!(single.coordinates, vec![[1, 1]]);
        }
    }

    #[test]
    fn test_build_curtain_ids_stay_sorted() {
        // insertion order deliberately scrambled
        let task = curtain_task(vec![5, 0, 4, 0, 3], vec![0, 5, 4, 0, 3]);
        let fetch = build_curtain(&task, &curtain_manifest()).unwrap();

        for pair in fetch.ids.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[test]
    fn test_build_curtain_length_mismatch() {
        let task = curtain_task(vec![0, 1], vec![0]);
        let err = build_curtain(&task, &curtain_manifest()).unwrap_err();
        assert!(matches!(
            err,
            PlanError::MalformedCurtain { dim0s: 2, dim1s: 1 }
        ));
    }

    fn fetch_with_ids(count: usize) -> SliceFetch {
        SliceFetch {
            pid: "c7bd6f74".to_string(),
            token: "...".to_string(),
            guid: "0d235a71".to_string(),
            storage_endpoint: "https://acc.blob.core.windows.net".to_string(),
            function: "slice".to_string(),
            shape: [3, 9, 5],
            shape_cube: [9, 15, 23],
            dim: 0,
            lineno: 0,
            ids: (0..count).map(|i| FragmentId::new(0, i, 0)).collect(),
        }
    }

    #[test]
    fn test_partition_chunks_in_order() {
        let mut fetch = fetch_with_ids(10);
        let original = fetch.ids.clone();
        let tasks = partition(&mut fetch, 3).unwrap();

        assert_eq!(tasks.len(), 4);

        let chunks: Vec<SliceFetch> = tasks
            .iter()
            .map(|task| SliceFetch::unpack(task).unwrap())
            .collect();
        assert_eq!(chunks[0].ids.len(), 3);
        assert_eq!(chunks[1].ids.len(), 3);
        assert_eq!(chunks[2].ids.len(), 3);
        assert_eq!(chunks[3].ids.len(), 1);

        let concatenated: Vec<FragmentId> =
            chunks.iter().flat_map(|chunk| chunk.ids.clone()).collect();
        assert_eq!(concatenated, original);

        // metadata repeats in every chunk
        for chunk in &chunks {
            assert_eq!(chunk.pid, "c7bd6f74");
            assert_eq!(chunk.shape_cube, [9, 15, 23]);
        }
    }

    #[test]
    fn test_partition_task_size_zero() {
        let err = partition(&mut fetch_with_ids(10), 0).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTaskSize(0)));
    }

    #[test]
    fn test_partition_empty_plan_still_emits_one_task() {
        let tasks = partition(&mut fetch_with_ids(0), 3).unwrap();
        assert_eq!(tasks.len(), 1);

        let chunk = SliceFetch::unpack(&tasks[0]).unwrap();
        assert!(chunk.ids.is_empty());
        assert_eq!(chunk.shape_cube, [9, 15, 23]);
    }

    #[test]
    fn test_unknown_function() {
        let err = plan(br#"{"function": "horizon"}"#, 10).unwrap_err();
        assert!(matches!(err, PlanError::UnknownFunction(name) if name == "horizon"));
    }

    #[test]
    fn test_envelope_without_function_is_malformed() {
        let err = plan(br#"{"pid": "c7bd6f74"}"#, 10).unwrap_err();
        assert!(matches!(err, PlanError::MalformedMessage(_)));
    }

    proptest::proptest! {
        #[test]
        fn partitions_are_equal_prefixes(count in 0usize..200, task_size in 1usize..50) {
            let mut fetch = fetch_with_ids(count);
            let original = fetch.ids.clone();
            let tasks = partition(&mut fetch, task_size).unwrap();

            let expected = if count == 0 {
                1
            } else {
                (count + task_size - 1) / task_size
            };
            assert_eq!(tasks.len(), expected);

            let chunks: Vec<SliceFetch> = tasks
                .iter()
                .map(|task| SliceFetch::unpack(task).unwrap())
                .collect();
            for chunk in &chunks[..chunks.len() - 1] {
                if count > 0 {
                    assert_eq!(chunk.ids.len(), task_size);
                }
            }

            let concatenated: Vec<FragmentId> =
                chunks.iter().flat_map(|chunk| chunk.ids.clone()).collect();
            assert_eq!(concatenated, original);
        }
    }
}
