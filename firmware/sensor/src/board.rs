//! Board glue: address switches, keep-alive LED and the sensor ADC input.
//!
//! Pin map (PFMB7201 rev A):
//!   ADDR0 PF0 (external pull), ADDR1 PF1, ADDR2..ADDR7 PA0..PA5
//!   SENSOR PA6 (ADC2_IN3), LED PB3

use embassy_futures::block_on;
use embassy_stm32::adc::Adc;
use embassy_stm32::gpio::{Input, Output};
use embassy_stm32::peripherals::{ADC2, PA6};
use embassy_time::with_timeout;
use flowbridge_link::{AnalogSource, ReadError, StatusIndicator, address_from_switches};

use crate::config::{ADC_FULL_SCALE, ADC_TIMEOUT, CALIBRATION};

/// Station address as set on the DIP switch. Read once at start-up; a change
/// takes effect after reset.
pub fn resolve_address(switches: &[Input<'_>; 8]) -> u8 {
    address_from_switches(core::array::from_fn(|bit| switches[bit].is_high()))
}

pub struct KeepaliveLed {
    pin: Output<'static>,
}

impl KeepaliveLed {
    pub fn new(pin: Output<'static>) -> Self {
        Self { pin }
    }
}

impl StatusIndicator for KeepaliveLed {
    fn toggle(&mut self) {
        self.pin.toggle();
    }
}

pub struct SensorInput {
    adc: Adc<'static, ADC2>,
    pin: PA6,
}

impl SensorInput {
    pub fn new(adc: Adc<'static, ADC2>, pin: PA6) -> Self {
        Self { adc, pin }
    }
}

impl AnalogSource for SensorInput {
    fn read_normalized_voltage(&mut self) -> Result<f32, ReadError> {
        let code = block_on(with_timeout(ADC_TIMEOUT, self.adc.read(&mut self.pin)))
            .map_err(|_| ReadError::Timeout)?;
        Ok(f32::from(code) / ADC_FULL_SCALE * CALIBRATION.reference_v)
    }
}
