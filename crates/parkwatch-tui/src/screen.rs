//! Screen identifiers, in tab-bar order.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScreenId {
    #[default]
    Map,
    Sites,
}

impl ScreenId {
    pub const ALL: [ScreenId; 2] = [Self::Map, Self::Sites];

    fn position(self) -> usize {
        Self::ALL.iter().position(|&s| s == self).unwrap_or(0)
    }

    /// Next screen in tab order (wraps around).
    pub fn next(self) -> Self {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    /// Previous screen in tab order (wraps around).
    pub fn prev(self) -> Self {
        Self::ALL[(self.position() + Self::ALL.len() - 1) % Self::ALL.len()]
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Map => "Map",
            Self::Sites => "Sites",
        }
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_order_wraps() {
        assert_eq!(ScreenId::Map.next(), ScreenId::Sites);
        assert_eq!(ScreenId::Sites.next(), ScreenId::Map);
        assert_eq!(ScreenId::Map.prev(), ScreenId::Sites);
    }
}
