use crate::ProviderId;

/// Stack of providers currently being resolved.
///
/// The chain is split into frames. Deferred consumption and targets of
/// auto-implemented methods open a fresh frame, so a provider may appear
/// again inside a nested frame without forming a cycle. Only a repeat within
/// one frame is a cycle.
#[derive(Debug)]
pub(crate) struct DependencyChain {
    frames: Vec<Vec<ProviderId>>,
}

impl DependencyChain {
    pub fn new() -> Self {
        Self {
            frames: vec![Vec::new()],
        }
    }

    /// Pushes `id` onto the innermost frame.
    ///
    /// Returns the cycle from the first occurrence of `id` when it is already
    /// in that frame.
    pub fn push(&mut self, id: ProviderId) -> Result<(), Vec<ProviderId>> {
        let frame = self.frame_mut();
        if let Some(pos) = frame.iter().position(|v| *v == id) {
            return Err(frame[pos..].to_vec());
        }
        frame.push(id);
        Ok(())
    }

    /// Pops `id`, returning the actual top when it does not match.
    pub fn pop(&mut self, id: ProviderId) -> Result<(), Option<ProviderId>> {
        let frame = self.frame_mut();
        match frame.last() {
            Some(v) if *v == id => {
                frame.pop();
                Ok(())
            }
            v => Err(v.copied()),
        }
    }

    pub fn contains(&self, id: ProviderId) -> bool {
        self.frames.last().is_some_and(|v| v.contains(&id))
    }

    pub fn open(&mut self) {
        self.frames.push(Vec::new());
    }

    /// Closes the innermost frame. The outermost frame is never closed.
    pub fn close(&mut self) -> Result<(), Option<ProviderId>> {
        if self.frames.len() == 1 {
            return Err(None);
        }
        match self.frames.pop() {
            Some(frame) if frame.is_empty() => Ok(()),
            Some(frame) => Err(frame.last().copied()),
            None => Err(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.len() == 1 && self.frames[0].is_empty()
    }

    fn frame_mut(&mut self) -> &mut Vec<ProviderId> {
        if self.frames.is_empty() {
            self.frames.push(Vec::new());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[usize]) -> Vec<ProviderId> {
        v.iter().copied().map(ProviderId::new).collect()
    }

    #[test]
    fn test_cycle() {
        let mut chain = DependencyChain::new();
        chain.push(ProviderId::new(0)).unwrap();
        chain.push(ProviderId::new(1)).unwrap();
        chain.push(ProviderId::new(2)).unwrap();
        assert_eq!(chain.push(ProviderId::new(1)), Err(ids(&[1, 2])));
    }

    #[test]
    fn test_nested_frame() {
        let mut chain = DependencyChain::new();
        chain.push(ProviderId::new(0)).unwrap();
        chain.open();
        assert!(!chain.contains(ProviderId::new(0)));
        chain.push(ProviderId::new(0)).unwrap();
        assert_eq!(chain.push(ProviderId::new(0)), Err(ids(&[0])));
        chain.pop(ProviderId::new(0)).unwrap();
        chain.close().unwrap();
        chain.pop(ProviderId::new(0)).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_pop_out_of_order() {
        let mut chain = DependencyChain::new();
        chain.push(ProviderId::new(0)).unwrap();
        chain.push(ProviderId::new(1)).unwrap();
        assert_eq!(chain.pop(ProviderId::new(0)), Err(Some(ProviderId::new(1))));
        chain.open();
        chain.push(ProviderId::new(2)).unwrap();
        assert_eq!(chain.close(), Err(Some(ProviderId::new(2))));
    }
}
