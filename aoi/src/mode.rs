use bitflags::bitflags;

bitflags! {
    /// Role flags of an entity.
    ///
    /// A `WATCHER` receives enter/leave notifications about entities around
    /// it. `MARKER` tags an entity as observable; notification delivery is
    /// decided by the watcher flag of each side alone.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mode: u8 {
        const WATCHER = 0b01;
        const MARKER = 0b10;
    }
}

impl Mode {
    /// Parse a mode string: `'w'` sets `WATCHER`, `'m'` sets `MARKER`, any
    /// other character is ignored. A missing letter means the flag is clear.
    pub fn parse(modestring: &str) -> Self {
        let mut mode = Mode::empty();
        for c in modestring.chars() {
            match c {
                'w' => mode |= Mode::WATCHER,
                'm' => mode |= Mode::MARKER,
                _ => {}
            }
        }
        mode
    }

    #[inline(always)]
    pub fn is_watcher(self) -> bool {
        self.contains(Mode::WATCHER)
    }

    #[inline(always)]
    pub fn is_marker(self) -> bool {
        self.contains(Mode::MARKER)
    }
}

impl From<&str> for Mode {
    fn from(modestring: &str) -> Self {
        Mode::parse(modestring)
    }
}
