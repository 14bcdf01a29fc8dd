use embassy_stm32::crc::{Config, Crc, InputReverseConfig, PolySize};
use embassy_stm32::peripherals::CRC;
use flowbridge_protocol::Checksum;

/// CRC-16/MODBUS on the CRC unit: polynomial 0x8005, seed 0xFFFF, bytes
/// bit-reversed on the way in and the result reversed on the way out.
pub struct HardwareCrc {
    unit: Crc<'static>,
}

impl HardwareCrc {
    pub fn new(peri: CRC) -> Option<Self> {
        let config = Config::new(
            InputReverseConfig::Byte,
            true,
            PolySize::Width16,
            0xFFFF,
            0x8005,
        )
        .ok()?;
        Some(Self {
            unit: Crc::new(peri, config),
        })
    }
}

impl Checksum for HardwareCrc {
    fn checksum(&mut self, data: &[u8]) -> u16 {
        self.unit.reset();
        self.unit.feed_bytes(data) as u16
    }
}
