//! Chronological evidence journey across a domain's hypotheses.

use std::collections::HashSet;

use crate::evidence::Evidence;
use crate::id::EvidenceId;

/// Evidence from several hypotheses, merged lazily by `observed_at`.
///
/// Iteration is restartable: every call to [`Journey::iter`] walks the merge
/// from the beginning. Evidence attached to more than one hypothesis is
/// yielded once.
#[derive(Debug, Clone, Default)]
pub struct Journey {
    lanes: Vec<Vec<Evidence>>,
}

impl Journey {
    pub(crate) fn new(lanes: Vec<Vec<Evidence>>) -> Self {
        let lanes = lanes
            .into_iter()
            .filter(|lane| !lane.is_empty())
            .map(|mut lane| {
                lane.sort_by_key(|e| e.observed_at);
                lane
            })
            .collect();
        Self { lanes }
    }

    /// Walks the merged journey from the start.
    #[must_use]
    pub fn iter(&self) -> JourneyIter<'_> {
        JourneyIter {
            lanes: &self.lanes,
            cursors: vec![0; self.lanes.len()],
            seen: HashSet::new(),
        }
    }

    /// True when no hypothesis in the domain carries evidence.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }
}

impl<'a> IntoIterator for &'a Journey {
    type Item = &'a Evidence;
    type IntoIter = JourneyIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// K-way merge over the journey's lanes.
#[derive(Debug)]
pub struct JourneyIter<'a> {
    lanes: &'a [Vec<Evidence>],
    cursors: Vec<usize>,
    seen: HashSet<EvidenceId>,
}

impl<'a> Iterator for JourneyIter<'a> {
    type Item = &'a Evidence;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut best: Option<(usize, &'a Evidence)> = None;
            for (lane_idx, lane) in self.lanes.iter().enumerate() {
                let Some(candidate) = lane.get(self.cursors[lane_idx]) else {
                    continue;
                };
                // Ties keep the earlier lane.
                if best.map_or(true, |(_, b)| candidate.observed_at < b.observed_at) {
                    best = Some((lane_idx, candidate));
                }
            }

            let (lane_idx, evidence) = best?;
            self.cursors[lane_idx] += 1;
            if self.seen.insert(evidence.id) {
                return Some(evidence);
            }
        }
    }
}
