use serde::Serialize;
use std::path::PathBuf;

/// Where a live ring buffer was placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RingBufferInfo {
    pub path: PathBuf,
    pub size: u64,
    pub fill: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

impl Whence {
    /// Maps the `lseek` constants used on the wire.
    pub fn from_raw(whence: i32) -> Option<Self> {
        match whence {
            libc::SEEK_SET => Some(Whence::Set),
            libc::SEEK_CUR => Some(Whence::Cur),
            libc::SEEK_END => Some(Whence::End),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw() {
        assert_eq!(Whence::from_raw(libc::SEEK_SET), Some(Whence::Set));
        assert_eq!(Whence::from_raw(libc::SEEK_CUR), Some(Whence::Cur));
        assert_eq!(Whence::from_raw(libc::SEEK_END), Some(Whence::End));
        assert_eq!(Whence::from_raw(42), None);
    }
}
