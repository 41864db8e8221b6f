#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(u64);

#[derive(Debug, Clone, Default)]
pub struct EpochClock {
    current: u64,
    in_flight: bool,
}

impl EpochClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> Epoch {
        self.current += 1;
        self.in_flight = true;
        Epoch(self.current)
    }

    pub fn invalidate(&mut self) {
        self.current += 1;
        self.in_flight = false;
    }

    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Returns `true` and clears the in-flight flag when `epoch` is current.
    pub fn settle(&mut self, epoch: Epoch) -> bool {
        if epoch.0 != self.current {
            return false;
        }
        self.in_flight = false;
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Settled<T> {
    Applied(T),
    Discarded,
}

impl<T> Settled<T> {
    #[must_use]
    pub fn is_discarded(&self) -> bool {
        matches!(self, Self::Discarded)
    }
}
