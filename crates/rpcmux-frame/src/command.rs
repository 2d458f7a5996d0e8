use crate::error::{Result, WireError};

/// Fixed capacity of a command identifier in bytes.
pub const COMMAND_CAPACITY: usize = 40;

/// Fixed-capacity command identifier.
///
/// Commands name the requested operation on `Request` frames. The name is
/// validated against [`COMMAND_CAPACITY`] at construction and zero-padded
/// on the wire; reading it back trims the padding, so construction followed
/// by [`Command::as_str`] recovers the original name exactly.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command([u8; COMMAND_CAPACITY]);

impl Command {
    /// Create a command from a human-readable name.
    ///
    /// Fails with [`WireError::CommandOverlength`] if the name does not fit.
    pub fn new(name: &str) -> Result<Self> {
        let bytes = name.as_bytes();
        if bytes.len() > COMMAND_CAPACITY {
            return Err(WireError::CommandOverlength {
                len: bytes.len(),
                max: COMMAND_CAPACITY,
            });
        }
        let mut buf = [0u8; COMMAND_CAPACITY];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Reconstruct a command from its wire representation.
    pub fn from_wire(buf: [u8; COMMAND_CAPACITY]) -> Self {
        Self(buf)
    }

    /// The raw zero-padded wire representation.
    pub fn as_wire(&self) -> &[u8; COMMAND_CAPACITY] {
        &self.0
    }

    /// The command name with padding trimmed.
    ///
    /// Trims trailing NUL and whitespace; non-UTF-8 identifiers (which
    /// cannot be produced by [`Command::new`]) render as empty.
    pub fn as_str(&self) -> &str {
        let end = self
            .0
            .iter()
            .rposition(|&b| b != 0 && b != b' ')
            .map_or(0, |i| i + 1);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }

    /// True for the all-zero command used by control frames (ping, close).
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Default for Command {
    fn default() -> Self {
        Self([0u8; COMMAND_CAPACITY])
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Command({:?})", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_valid_names() {
        for name in ["get_host", "a", "", "tail_log", &"x".repeat(COMMAND_CAPACITY)] {
            let cmd = Command::new(name).unwrap();
            assert_eq!(cmd.as_str(), name);
            assert_eq!(cmd.to_string(), name);
        }
    }

    #[test]
    fn overlength_name_rejected() {
        let name = "y".repeat(COMMAND_CAPACITY + 1);
        let err = Command::new(&name).unwrap_err();
        assert!(matches!(
            err,
            WireError::CommandOverlength { len: 41, max: 40 }
        ));
    }

    #[test]
    fn wire_roundtrip_preserves_identity() {
        let cmd = Command::new("ping_echo").unwrap();
        let restored = Command::from_wire(*cmd.as_wire());
        assert_eq!(cmd, restored);
        assert_eq!(restored.as_str(), "ping_echo");
    }

    #[test]
    fn trims_space_padding_from_the_wire() {
        let mut buf = [0u8; COMMAND_CAPACITY];
        buf[..5].copy_from_slice(b"cmd  ");
        let cmd = Command::from_wire(buf);
        assert_eq!(cmd.as_str(), "cmd");
    }

    #[test]
    fn default_is_empty() {
        let cmd = Command::default();
        assert!(cmd.is_empty());
        assert_eq!(cmd.as_str(), "");
        assert!(!Command::new("x").unwrap().is_empty());
    }

    #[test]
    fn equal_names_hash_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Command::new("get_host").unwrap());
        assert!(set.contains(&Command::new("get_host").unwrap()));
        assert!(!set.contains(&Command::new("get_proc").unwrap()));
    }
}
