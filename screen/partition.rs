//! Turns the optimizer's flat partition-size vector into the ordered list of
//! initial pools.

use crate::error::ScreenError;
use crate::types::GroupRange;

/// Walks `sizes` from index 0, emitting `[i, i + sizes[i] - 1]` at every group
/// start and jumping ahead by `sizes[i]`.
///
/// Entries between group starts are never read. A zero size at a group start
/// or a group that runs past the end of the population is a malformed design.
pub fn load_initial_groups(sizes: &[usize]) -> Result<Vec<GroupRange>, ScreenError> {
    let n = sizes.len();
    let mut groups = Vec::new();
    let mut i = 0;

    while i < n {
        let size = sizes[i];
        if size == 0 {
            return Err(ScreenError::MalformedDesign(format!(
                "initial partition has size 0 at group start {i}"
            )));
        }
        let end = i + size - 1;
        if end >= n {
            return Err(ScreenError::MalformedDesign(format!(
                "initial group starting at {i} has size {size}, running past the population of {n}"
            )));
        }
        groups.push(GroupRange::new(i, end));
        i += size;
    }

    Ok(groups)
}
