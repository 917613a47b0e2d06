//! Static round-robin assignment of iterations to workers
//!
//! With `W` workers, worker `w` runs iterations `w, w+W, w+2W, ...`. Each
//! worker's share is a strided shard; together the shards cover `0..n`
//! exactly once. No worker is created for a shard that would be empty.

use thiserror::Error;

/// Errors that can occur while assigning iterations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssignError {
    #[error("worker_count must be greater than 0")]
    NoWorkers,
}

/// The iterations assigned to one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerShard {
    /// Worker index, `0..workers`
    pub worker: usize,
    /// First iteration
    pub start: usize,
    /// Distance between consecutive iterations (the worker count)
    pub stride: usize,
    /// Number of iterations
    pub count: usize,
}

impl WorkerShard {
    /// Returns the number of iterations in this shard
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if this shard has no iterations
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns an iterator over the iterations in this shard
    pub fn indices(&self) -> ShardIndices {
        ShardIndices {
            current: self.start,
            stride: self.stride,
            remaining: self.count,
        }
    }

    pub fn to_vec(&self) -> Vec<usize> {
        self.indices().collect()
    }
}

/// Iterator over the iterations of a shard
#[derive(Debug, Clone)]
pub struct ShardIndices {
    current: usize,
    stride: usize,
    remaining: usize,
}

impl Iterator for ShardIndices {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            None
        } else {
            let val = self.current;
            self.current += self.stride;
            self.remaining -= 1;
            Some(val)
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for ShardIndices {}

/// Iterations of one call spread over the worker pool
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Total number of iterations
    pub n: usize,

    /// Configured pool size
    pub workers: usize,

    /// One shard per active worker, ordered by worker index
    pub shards: Vec<WorkerShard>,
}

impl Assignment {
    /// Number of workers that receive at least one iteration
    pub fn active_workers(&self) -> usize {
        self.shards.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkerShard> {
        self.shards.iter()
    }

    /// Worker that runs iteration `i`
    pub fn worker_of(&self, i: usize) -> Option<usize> {
        (i < self.n).then(|| i % self.workers)
    }

    /// Verify that all iterations from 0 to n-1 are covered exactly once
    #[cfg(test)]
    fn verify_coverage(&self) -> bool {
        let mut seen = vec![false; self.n];
        for shard in &self.shards {
            for idx in shard.indices() {
                if idx >= self.n || seen[idx] {
                    return false;
                }
                seen[idx] = true;
            }
        }
        seen.iter().all(|&b| b)
    }
}

impl<'a> IntoIterator for &'a Assignment {
    type Item = &'a WorkerShard;
    type IntoIter = std::slice::Iter<'a, WorkerShard>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Assign `n` iterations to `workers` workers round-robin
///
/// # Example
///
/// ```
/// use fanout::assign::round_robin;
///
/// let plan = round_robin(10, 4).unwrap();
/// assert_eq!(plan.shards[0].to_vec(), vec![0, 4, 8]);
/// assert_eq!(plan.shards[3].to_vec(), vec![3, 7]);
/// ```
pub fn round_robin(n: usize, workers: usize) -> Result<Assignment, AssignError> {
    if workers == 0 {
        return Err(AssignError::NoWorkers);
    }

    let active = workers.min(n);
    let shards = (0..active)
        .map(|start| WorkerShard {
            worker: start,
            start,
            stride: workers,
            count: (n - start).div_ceil(workers),
        })
        .collect();

    Ok(Assignment { n, workers, shards })
}
