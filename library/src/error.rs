use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// Channel id out of range, or the channel has nothing bound to it.
    InvalidChannel,
    /// Frequency is too low for the 32 bit tick accumulator, not a positive
    /// finite number, or no callback was supplied.
    RejectedFrequency,
    /// Every channel (or software slot) is already in use.
    NoFreeChannel,
    /// The requested duration or repeat count amounts to less than one run.
    DurationTooShort,
    /// Zero length interval.
    InvalidInterval,
}

impl TimerError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidChannel => "invalid channel",
            Self::RejectedFrequency => "rejected frequency",
            Self::NoFreeChannel => "no free channel",
            Self::DurationTooShort => "duration too short",
            Self::InvalidInterval => "invalid interval",
        }
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ufmt::uDisplay for TimerError {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
        where W: ufmt::uWrite + ?Sized
    {
        f.write_str(self.as_str())
    }
}

pub type TimerResult<T> = Result<T, TimerError>;

#[cfg(test)]
mod tests {
    use str_buf::StrBuf;
    use super::*;

    #[test]
    fn display_matches_udisplay() {
        let mut buffer = StrBuf::<32>::new();
        ufmt::uwrite!(&mut buffer, "{}", TimerError::NoFreeChannel).unwrap();
        assert_eq!(buffer.as_str(), "no free channel");
        assert_eq!(TimerError::NoFreeChannel.as_str(), "no free channel");
    }
}
