use anyhow::Result;
use std::time::Duration;

use super::{TagValue, TagWriter};

/// A raised boolean tag that is lowered again when the pulse ends.
///
/// `raise` writes `true`; `finish` waits out the hold time and writes
/// `false`. If the guard is dropped without `finish` (an error unwound past
/// it) the reset is still attempted and any failure is logged.
pub struct FlagPulse<'a, W: TagWriter + ?Sized> {
    writer: &'a mut W,
    tag: &'a str,
    lowered: bool,
}

impl<'a, W: TagWriter + ?Sized> FlagPulse<'a, W> {
    pub fn raise(writer: &'a mut W, tag: &'a str) -> Result<Self> {
        writer.write_tag(tag, TagValue::Bool(true))?;
        Ok(Self {
            writer,
            tag,
            lowered: false,
        })
    }

    /// Hold the flag for `hold`, then lower it.
    pub fn finish(mut self, hold: Duration) -> Result<()> {
        if !hold.is_zero() {
            std::thread::sleep(hold);
        }
        self.lowered = true;
        self.writer.write_tag(self.tag, TagValue::Bool(false))
    }
}

impl<W: TagWriter + ?Sized> Drop for FlagPulse<'_, W> {
    fn drop(&mut self) {
        if self.lowered {
            return;
        }
        if let Err(err) = self.writer.write_tag(self.tag, TagValue::Bool(false)) {
            log::error!("failed to reset {} after aborted pulse: {:#}", self.tag, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(String, TagValue)>,
    }

    impl TagWriter for Recorder {
        fn write_tag(&mut self, tag: &str, value: TagValue) -> Result<()> {
            self.writes.push((tag.to_string(), value));
            Ok(())
        }
    }

    #[test]
    fn finish_lowers_once() -> Result<()> {
        let mut rec = Recorder::default();
        FlagPulse::raise(&mut rec, "NewData")?.finish(Duration::ZERO)?;
        assert_eq!(
            rec.writes,
            vec![
                ("NewData".to_string(), TagValue::Bool(true)),
                ("NewData".to_string(), TagValue::Bool(false)),
            ]
        );
        Ok(())
    }

    #[test]
    fn dropped_pulse_still_resets() -> Result<()> {
        let mut rec = Recorder::default();
        let outcome: Result<()> = (|| {
            let _pulse = FlagPulse::raise(&mut rec, "NewData")?;
            Err(anyhow!("interrupted"))
        })();
        assert!(outcome.is_err());
        assert_eq!(rec.writes.last(), Some(&("NewData".to_string(), TagValue::Bool(false))));
        assert_eq!(rec.writes.len(), 2);
        Ok(())
    }
}
