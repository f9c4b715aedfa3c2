use std::borrow::Cow;

use nix::errno::Errno;
use thiserror::Error;

/// An errno-tagged control-plane error.
///
/// Every fallible operation in this workspace returns at most one kind tag
/// drawn from the POSIX errno set (§7); `message` carries the human-readable
/// context a caller would otherwise have to reconstruct from the tag alone.
/// `thiserror`'s derive gives us `Display`/`std::error::Error` so this
/// composes with `?` across module boundaries without a hand-rolled impl.
#[derive(Debug, Clone, Error)]
#[error("{errno}: {message}")]
pub struct CoreError {
    errno: Errno,
    message: Cow<'static, str>,
}

impl CoreError {
    pub fn new(errno: Errno, message: impl Into<Cow<'static, str>>) -> Self {
        CoreError {
            errno,
            message: message.into(),
        }
    }

    #[inline]
    pub fn errno(&self) -> Errno {
        self.errno
    }

    /// The negative errno value as transmitted on the wire (§6/§7).
    #[inline]
    pub fn wire_status(&self) -> i32 {
        -(self.errno as i32)
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn eexist(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::EEXIST, msg)
    }
    pub fn enodev(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::ENODEV, msg)
    }
    pub fn enoent(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::ENOENT, msg)
    }
    pub fn eidrm(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::EIDRM, msg)
    }
    pub fn emediumtype(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::EMEDIUMTYPE, msg)
    }
    pub fn eaddrinuse(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::EADDRINUSE, msg)
    }
    pub fn ebusy(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::EBUSY, msg)
    }
    pub fn einval(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::EINVAL, msg)
    }
    pub fn enomem(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::ENOMEM, msg)
    }
    pub fn enotsup(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::ENOTSUP, msg)
    }
    pub fn enosys(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::new(Errno::ENOSYS, msg)
    }

    /// `true` for the pair of tags port reconfig explicitly tolerates when
    /// enabling a VLAN hardware filter (§7).
    #[inline]
    pub fn is_filter_unsupported(&self) -> bool {
        matches!(self.errno, Errno::ENOTSUP | Errno::ENOSYS)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
