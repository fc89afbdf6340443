//! Reviewer selection for newly created pull requests.

use crate::model::{UserId, MAX_REVIEWERS};
use crate::random::RandomSource;

/// Pick up to `MAX_REVIEWERS` reviewers from `candidates`.
///
/// `candidates` are the active members of the author's team with the author
/// already removed. The pick is uniform without replacement and ignores
/// current review load. An empty roster yields an empty list.
pub fn select_reviewers(mut candidates: Vec<UserId>, random: &dyn RandomSource) -> Vec<UserId> {
    random.shuffle(&mut candidates);
    candidates.truncate(MAX_REVIEWERS);
    candidates
}
