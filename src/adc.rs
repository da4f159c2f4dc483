//! MCP3008 channel reader.
//!
//! Single-ended read: send `[0x01, (8 + ch) << 4, 0x00]`, the 10-bit result
//! is the low two bits of byte 1 followed by byte 2.

use crate::domain::RawSample;
use crate::hal::{BusError, SpiTransport};

/// adc inputs wired to the gas sensors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdcChannel {
    Mq135 = 0,
    Mq9 = 1,
}

impl AdcChannel {
    pub fn index(self) -> u8 {
        self as u8
    }
}

pub struct AdcReader<S> {
    bus: S,
}

impl<S: SpiTransport> AdcReader<S> {
    pub fn new(bus: S) -> Self {
        Self { bus }
    }

    /// one transfer, no retry
    pub fn read_raw_channel(&mut self, channel: AdcChannel) -> Result<RawSample, BusError> {
        let rx = self.bus.transfer(command(channel))?;
        let code = (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]);
        // masked to 10 bits above
        RawSample::new(code).ok_or_else(|| BusError(format!("code {} out of range", code)))
    }
}

fn command(channel: AdcChannel) -> [u8; 3] {
    [0x01, (8 + channel.index()) << 4, 0x00]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// replays canned responses and records what was sent
    #[derive(Default)]
    struct ScriptedSpi {
        responses: VecDeque<Result<[u8; 3], BusError>>,
        sent: Vec<[u8; 3]>,
    }

    impl SpiTransport for ScriptedSpi {
        fn transfer(&mut self, tx: [u8; 3]) -> Result<[u8; 3], BusError> {
            self.sent.push(tx);
            self.responses
                .pop_front()
                .unwrap_or_else(|| Err(BusError("no response".into())))
        }
    }

    #[test]
    fn selects_channel_and_decodes_ten_bits() {
        let mut spi = ScriptedSpi::default();
        // junk in the upper bits of byte 1 must be masked off
        spi.responses.push_back(Ok([0xFF, 0xFE, 0x00]));
        spi.responses.push_back(Ok([0x00, 0x01, 0x2C]));

        let mut reader = AdcReader::new(spi);
        assert_eq!(reader.read_raw_channel(AdcChannel::Mq135).unwrap().code(), 512);
        assert_eq!(reader.read_raw_channel(AdcChannel::Mq9).unwrap().code(), 300);
        assert_eq!(reader.bus.sent, vec![[0x01, 0x80, 0x00], [0x01, 0x90, 0x00]]);
    }

    #[test]
    fn bus_fault_surfaces_without_retry() {
        let mut spi = ScriptedSpi::default();
        spi.responses.push_back(Err(BusError("EIO".into())));

        let mut reader = AdcReader::new(spi);
        let err = reader.read_raw_channel(AdcChannel::Mq9).unwrap_err();
        assert!(err.to_string().contains("EIO"));
        assert_eq!(reader.bus.sent.len(), 1);
    }
}
