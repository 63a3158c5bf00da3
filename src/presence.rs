/// Last reported presence state, unknown until the first frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresenceTracker {
    last: Option<bool>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `present` and return it when it differs from the stored state.
    /// The first observation always counts as a change.
    pub fn update(&mut self, present: bool) -> Option<bool> {
        if self.last == Some(present) {
            return None;
        }
        self.last = Some(present);
        Some(present)
    }

    pub fn state(&self) -> Option<bool> {
        self.last
    }
}
