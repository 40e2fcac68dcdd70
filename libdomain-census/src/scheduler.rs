use crate::generator::CandidateSource;

/// Round-robin over independent candidate sources, one whole block at a time.
/// Sources that ran out (under the stop policy) are retired and skipped.
pub struct BlockScheduler {
    sources: Vec<Box<dyn CandidateSource>>,
    retired: Vec<bool>,
    next: usize,
}

impl BlockScheduler {
    pub fn new(sources: Vec<Box<dyn CandidateSource>>) -> Self {
        let retired = vec![false; sources.len()];
        Self {
            sources,
            retired,
            next: 0,
        }
    }

    /// Index of the source that runs the next block, or `None` once all are retired.
    pub fn next_index(&mut self) -> Option<usize> {
        let count = self.sources.len();
        for offset in 0..count {
            let index = (self.next + offset) % count;
            if !self.retired[index] {
                self.next = (index + 1) % count;
                return Some(index);
            }
        }
        None
    }

    pub fn source_mut(&mut self, index: usize) -> &mut (dyn CandidateSource + 'static) {
        self.sources[index].as_mut()
    }

    pub fn sources_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn CandidateSource>> {
        self.sources.iter_mut()
    }

    pub fn retire(&mut self, index: usize) {
        self.retired[index] = true;
    }
}
