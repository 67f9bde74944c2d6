#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum SignalLevel {
    #[default]
    Low,
    High,
}

impl SignalLevel {
    pub fn from_bool(value: bool) -> Self {
        if value { SignalLevel::High } else { SignalLevel::Low }
    }

    pub fn is_high(self) -> bool {
        self == SignalLevel::High
    }
}

impl From<bool> for SignalLevel {
    fn from(value: bool) -> Self {
        SignalLevel::from_bool(value)
    }
}

// Reports a transition into target_level, exactly once per transition.
#[derive(Clone, Copy, Debug)]
pub struct EdgeDetector {
    target_level: SignalLevel,

    previous_level: SignalLevel,
    current_level: SignalLevel,
}

impl EdgeDetector {
    pub const fn rising() -> Self {
        Self::new(SignalLevel::High, SignalLevel::Low)
    }

    pub const fn falling() -> Self {
        Self::new(SignalLevel::Low, SignalLevel::High)
    }

    const fn new(target_level: SignalLevel, initial_level: SignalLevel) -> Self {
        Self {
            target_level,
            previous_level: initial_level,
            current_level: initial_level,
        }
    }

    pub fn current_level(&self) -> SignalLevel {
        self.current_level
    }

    pub fn set_level(&mut self, level: SignalLevel) {
        self.current_level = level;
    }

    pub fn detect(&mut self) -> bool {
        let edge_detected = self.current_level == self.target_level
            && self.previous_level != self.current_level;
        self.previous_level = self.current_level;
        edge_detected
    }

    pub fn set_level_then_detect(&mut self, level: SignalLevel) -> bool {
        self.set_level(level);
        self.detect()
    }

    // Forget history without reporting an edge.
    pub fn force_level(&mut self, level: SignalLevel) {
        self.previous_level = level;
        self.current_level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rising_edge_reported_once() {
        let mut clock = EdgeDetector::rising();
        assert!(!clock.set_level_then_detect(SignalLevel::Low));
        assert!(clock.set_level_then_detect(SignalLevel::High));
        assert!(!clock.set_level_then_detect(SignalLevel::High));
        assert!(!clock.set_level_then_detect(SignalLevel::Low));
        assert!(clock.set_level_then_detect(SignalLevel::High));
    }

    #[test]
    fn falling_edge_ignores_rise() {
        let mut detector = EdgeDetector::falling();
        assert!(!detector.set_level_then_detect(SignalLevel::High));
        assert!(detector.set_level_then_detect(SignalLevel::Low));
        assert!(!detector.set_level_then_detect(SignalLevel::Low));
    }

    #[test]
    fn forced_level_is_not_an_edge() {
        let mut clock = EdgeDetector::rising();
        clock.force_level(SignalLevel::High);
        assert!(!clock.detect());
        assert_eq!(clock.current_level(), SignalLevel::High);
    }
}
