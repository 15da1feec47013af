//! Deferred evaluation of provider asynchrony.
//!
//! Whether a provider is async depends on providers that may not have been
//! visited yet when it is visited, so the visit only records the facts the
//! flag is derived from. The flags are evaluated in one pass once every
//! provider has been visited and every decorator attached.

use std::mem;

use crate::ProviderId;

/// One fact a provider's async flag is derived from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum AsyncTerm {
    /// Async regardless of anything else: an async factory, decorator or
    /// creation hook, or an async service of a nested graph.
    Inherent,
    /// A non-deferred injection that waits when the provider is async.
    Awaits(ProviderId),
    /// An auto-implemented synchronous method that hoists the awaited
    /// arguments of its target.
    Hoists(ProviderId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum AsyncState {
    #[default]
    Unvisited,
    Pending,
    Evaluating,
    Resolved(bool),
}

/// Self-memoizing async flag of one provider.
#[derive(Clone, Debug, Default)]
pub(crate) struct AsyncCell {
    terms: Vec<AsyncTerm>,
    /// Providers awaited by the factory and decorator arguments, which an
    /// auto-implemented method may hoist.
    hoistable: Vec<ProviderId>,
    /// Providers awaited elsewhere, which stay awaited after hoisting.
    fixed: Vec<ProviderId>,
    state: AsyncState,
}

impl AsyncCell {
    pub fn pending(
        terms: Vec<AsyncTerm>,
        hoistable: Vec<ProviderId>,
        fixed: Vec<ProviderId>,
    ) -> Self {
        Self {
            terms,
            hoistable,
            fixed,
            state: AsyncState::Pending,
        }
    }

    /// Returns the flag once it has been resolved.
    pub fn get(&self) -> Option<bool> {
        match self.state {
            AsyncState::Resolved(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_visited(&self) -> bool {
        self.state != AsyncState::Unvisited
    }

    pub fn hoistable(&self) -> &[ProviderId] {
        &self.hoistable
    }

    /// Whether the provider stays async after its hoistable awaits are
    /// moved out of its construction. Requires resolved cells.
    pub fn is_async_without_hoistable(&self, cells: &[AsyncCell]) -> bool {
        self.terms.iter().any(|term| match term {
            AsyncTerm::Awaits(id) if self.hoistable.contains(id) && !self.fixed.contains(id) => {
                false
            }
            term => term_value(*term, cells).unwrap_or(false),
        })
    }
}

fn term_value(term: AsyncTerm, cells: &[AsyncCell]) -> Option<bool> {
    match term {
        AsyncTerm::Inherent => Some(true),
        AsyncTerm::Awaits(id) => cells.get(id.index())?.get(),
        AsyncTerm::Hoists(target) => {
            let target = cells.get(target.index())?;
            let mut result = false;
            for id in target.hoistable() {
                result |= cells.get(id.index())?.get()?;
            }
            Some(result)
        }
    }
}

/// Evaluates every visited cell.
///
/// Returns the id of an unvisited provider that a visited one depends on,
/// which means the visit pass did not cover the whole graph.
pub(crate) fn resolve_all(cells: &mut [AsyncCell]) -> Result<(), ProviderId> {
    let mut evaluator = Evaluator {
        cells,
        cyclic: false,
    };
    for index in 0..evaluator.cells.len() {
        if evaluator.cells[index].is_visited() {
            evaluator.evaluate(ProviderId::new(index))?;
        }
    }
    if evaluator.cyclic {
        evaluator.settle();
    }
    Ok(())
}

struct Evaluator<'a> {
    cells: &'a mut [AsyncCell],
    /// Set when evaluation met a cell that was still being evaluated.
    cyclic: bool,
}

impl Evaluator<'_> {
    fn evaluate(&mut self, id: ProviderId) -> Result<bool, ProviderId> {
        let cell = self.cells.get_mut(id.index()).ok_or(id)?;
        match cell.state {
            AsyncState::Resolved(v) => return Ok(v),
            AsyncState::Unvisited => return Err(id),
            AsyncState::Evaluating => {
                // Contributes nothing for now, fixed up by `settle`.
                self.cyclic = true;
                return Ok(false);
            }
            AsyncState::Pending => cell.state = AsyncState::Evaluating,
        }
        let terms = mem::take(&mut cell.terms);
        let mut result = false;
        for term in &terms {
            result = match *term {
                AsyncTerm::Inherent => true,
                AsyncTerm::Awaits(dependency) => self.evaluate(dependency)?,
                AsyncTerm::Hoists(target) => {
                    let hoistable = self.cells.get(target.index()).ok_or(target)?.hoistable.clone();
                    let mut hoists = false;
                    for dependency in hoistable {
                        if self.evaluate(dependency)? {
                            hoists = true;
                            break;
                        }
                    }
                    hoists
                }
            };
            if result {
                break;
            }
        }
        let cell = &mut self.cells[id.index()];
        cell.terms = terms;
        cell.state = AsyncState::Resolved(result);
        Ok(result)
    }

    /// Propagates `true` through cycles until nothing changes.
    ///
    /// The flags form a monotone system, so this reaches its least fixed point.
    fn settle(&mut self) {
        loop {
            let mut changed = false;
            for index in 0..self.cells.len() {
                if self.cells[index].get() != Some(false) {
                    continue;
                }
                let cells = &*self.cells;
                let result = cells[index]
                    .terms
                    .iter()
                    .any(|term| term_value(*term, cells).unwrap_or(false));
                if result {
                    self.cells[index].state = AsyncState::Resolved(true);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: usize) -> ProviderId {
        ProviderId::new(index)
    }

    #[test]
    fn test_transitive() {
        let mut cells = vec![
            AsyncCell::pending(vec![AsyncTerm::Awaits(id(1))], vec![id(1)], vec![]),
            AsyncCell::pending(vec![AsyncTerm::Awaits(id(2))], vec![id(2)], vec![]),
            AsyncCell::pending(vec![AsyncTerm::Inherent], vec![], vec![]),
            AsyncCell::pending(vec![], vec![], vec![]),
        ];
        resolve_all(&mut cells).unwrap();
        let flags: Vec<_> = cells.iter().map(|v| v.get()).collect();
        assert_eq!(flags, vec![Some(true), Some(true), Some(true), Some(false)]);
    }

    #[test]
    fn test_forward_reference_to_unvisited() {
        let mut cells = vec![
            AsyncCell::pending(vec![AsyncTerm::Awaits(id(1))], vec![], vec![]),
            AsyncCell::default(),
        ];
        assert_eq!(resolve_all(&mut cells), Err(id(1)));
    }

    #[test]
    fn test_unvisited_cells_are_skipped() {
        let mut cells = vec![AsyncCell::default(), AsyncCell::pending(vec![], vec![], vec![])];
        resolve_all(&mut cells).unwrap();
        assert_eq!(cells[0].get(), None);
        assert_eq!(cells[1].get(), Some(false));
    }

    #[test]
    fn test_hoists() {
        let mut cells = vec![
            // Auto-implemented method creating #1.
            AsyncCell::pending(vec![AsyncTerm::Hoists(id(1))], vec![], vec![]),
            // Target awaiting #2 in its factory.
            AsyncCell::pending(vec![AsyncTerm::Awaits(id(2))], vec![id(2)], vec![]),
            AsyncCell::pending(vec![AsyncTerm::Inherent], vec![], vec![]),
        ];
        resolve_all(&mut cells).unwrap();
        assert_eq!(cells[0].get(), Some(true));
        assert!(!cells[1].is_async_without_hoistable(&cells));
    }

    #[test]
    fn test_fixed_await_is_not_hoistable() {
        let mut cells = vec![
            // Target awaiting #1 in its factory and in its creation hook.
            AsyncCell::pending(vec![AsyncTerm::Awaits(id(1))], vec![id(1)], vec![id(1)]),
            AsyncCell::pending(vec![AsyncTerm::Inherent], vec![], vec![]),
        ];
        resolve_all(&mut cells).unwrap();
        assert!(cells[0].is_async_without_hoistable(&cells));
    }

    #[test]
    fn test_cycle_settles() {
        // #1 is evaluated while #0 is still in progress and first sees false.
        let mut cells = vec![
            AsyncCell::pending(
                vec![AsyncTerm::Awaits(id(1)), AsyncTerm::Inherent],
                vec![],
                vec![],
            ),
            AsyncCell::pending(vec![AsyncTerm::Awaits(id(0))], vec![id(0)], vec![]),
            AsyncCell::pending(vec![AsyncTerm::Hoists(id(1))], vec![], vec![]),
            AsyncCell::pending(vec![AsyncTerm::Awaits(id(2))], vec![], vec![]),
        ];
        resolve_all(&mut cells).unwrap();
        assert!(cells.iter().all(|v| v.get() == Some(true)));
    }
}
