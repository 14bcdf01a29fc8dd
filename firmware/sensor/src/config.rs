//! Fixed link and measurement settings for the PFMB board.

use embassy_time::Duration;
use flowbridge_calibration::CalibrationParams;
use flowbridge_link::LineTiming;

pub const BAUD: u32 = 9_600;
pub const DATA_BITS: u8 = 8;
pub const PARITY: bool = false;
pub const STOP_BITS: u8 = 2;

pub const LINE_TIMING: LineTiming = LineTiming::new(BAUD, DATA_BITS, PARITY, STOP_BITS);

/// Bound on a single ADC conversion, including the zero-flow sample.
pub const ADC_TIMEOUT: Duration = Duration::from_millis(100);
/// Bound on a whole 7-byte reply, DE assert to last stop bit.
pub const TX_TIMEOUT: Duration = Duration::from_millis(1_000);

pub const CALIBRATION: CalibrationParams = CalibrationParams::new(
    flowbridge_calibration::REFERENCE_RAIL_V,
    flowbridge_calibration::ZERO_FLOOR_V,
    flowbridge_calibration::FULL_SCALE_UNITS,
);

/// 12-bit right-aligned conversions.
pub const ADC_FULL_SCALE: f32 = 4095.0;

pub const STATS_LOG_PERIOD: Duration = Duration::from_secs(30);
