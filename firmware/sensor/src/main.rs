#![no_std]
#![no_main]

use defmt::*;
use defmt_rtt as _;
use panic_probe as _;

use cortex_m_rt::entry;
use embassy_stm32 as stm32;
use embassy_stm32::adc::{self, Adc, SampleTime};
use embassy_stm32::bind_interrupts;
use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
use embassy_stm32::usart::{
    Config as UartConfig, DataBits as UartDataBits, Parity as UartParity,
    StopBits as UartStopBits, Uart,
};
use embassy_time::Instant;
use flowbridge_link::{
    CommandQueue, DispatchOutcome, Dispatcher, LinkStats, Reject, RxPath, calibrate,
};
use static_cell::StaticCell;

mod board;
mod config;
mod hwcrc;
mod rs485;

use board::{KeepaliveLed, SensorInput, resolve_address};
use config::{BAUD, CALIBRATION, STATS_LOG_PERIOD};
use hwcrc::HardwareCrc;
use rs485::Rs485Tx;

bind_interrupts!(struct Irqs {
    ADC1_2 => adc::InterruptHandler<stm32::peripherals::ADC2>;
});

static COMMAND_QUEUE: StaticCell<CommandQueue> = StaticCell::new();
static LINK_STATS: LinkStats = LinkStats::new();

/// Parks the core. The RS485 receiver is never armed on this path, so the
/// station stays silent on the bus.
fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

#[entry]
fn main() -> ! {
    info!("{}", env!("FLOWBRIDGE_FW_VERSION"));

    // 8 MHz HSE x9 -> 72 MHz SYSCLK, APB1 36 MHz, ADC12 from PLL.
    let mut config = stm32::Config::default();
    {
        use embassy_stm32::rcc::*;
        use embassy_stm32::time::Hertz;

        config.rcc.hse = Some(Hse {
            freq: Hertz(8_000_000),
            mode: HseMode::Oscillator,
        });
        config.rcc.pll = Some(Pll {
            src: PllSource::HSE,
            prediv: PllPreDiv::DIV1,
            mul: PllMul::MUL9,
        });
        config.rcc.sys = Sysclk::PLL1_P;
        config.rcc.ahb_pre = AHBPrescaler::DIV1;
        config.rcc.apb1_pre = APBPrescaler::DIV2;
        config.rcc.apb2_pre = APBPrescaler::DIV1;
        config.rcc.adc = AdcClockSource::Pll(AdcPllPrescaler::DIV1);
    }
    let p = stm32::init(config);

    let mut led = KeepaliveLed::new(Output::new(p.PB3, Level::Low, Speed::Low));

    let switches = [
        Input::new(p.PF0, Pull::None),
        Input::new(p.PF1, Pull::Up),
        Input::new(p.PA0, Pull::Up),
        Input::new(p.PA1, Pull::Up),
        Input::new(p.PA2, Pull::Up),
        Input::new(p.PA3, Pull::Up),
        Input::new(p.PA4, Pull::Up),
        Input::new(p.PA5, Pull::Up),
    ];
    let address = resolve_address(&switches);
    info!("station address 0x{:02x}", address);

    let mut adc = Adc::new(p.ADC2, Irqs);
    adc.set_sample_time(SampleTime::CYCLES181_5);
    let mut sensor = SensorInput::new(adc, p.PA6);

    let Some(crc) = HardwareCrc::new(p.CRC) else {
        error!("CRC unit rejected the CRC-16/MODBUS configuration");
        halt();
    };

    let calibration = match calibrate(&mut sensor, &CALIBRATION) {
        Ok(cal) => {
            info!(
                "calibrated: zero {} V, step {} V/unit",
                cal.zero_offset(),
                cal.step_per_unit()
            );
            cal
        }
        Err(err) => {
            error!("calibration failed: {}; halting", err);
            halt();
        }
    };

    let mut uart_cfg = UartConfig::default();
    uart_cfg.baudrate = BAUD;
    uart_cfg.data_bits = UartDataBits::DataBits8;
    uart_cfg.parity = UartParity::ParityNone;
    uart_cfg.stop_bits = UartStopBits::STOP2;
    let uart = match Uart::new_blocking(p.USART1, p.PA10, p.PA9, uart_cfg) {
        Ok(uart) => uart,
        Err(err) => {
            error!("USART1 config rejected: {:?}", err);
            halt();
        }
    };
    let mut bus = Rs485Tx::new(uart, Output::new(p.PA12, Level::Low, Speed::Medium));

    let queue = COMMAND_QUEUE.init(CommandQueue::new());
    let (producer, mut consumer) = queue.split();
    rs485::start_receiver(RxPath::new(address, producer, &LINK_STATS));

    let mut dispatcher = Dispatcher::new(calibration, crc, &LINK_STATS);
    let mut next_stats_log = Instant::now() + STATS_LOG_PERIOD;

    info!("flowbridge ready");

    loop {
        match dispatcher.poll(&mut consumer, &mut sensor, &mut bus, &mut led) {
            DispatchOutcome::Idle | DispatchOutcome::Replied { .. } => {}
            DispatchOutcome::Rejected(Reject::NoFunction) => {}
            DispatchOutcome::Rejected(Reject::Checksum { computed, received }) => {
                debug!(
                    "crc mismatch: computed 0x{:04x}, received 0x{:04x}",
                    computed, received
                );
            }
            DispatchOutcome::Rejected(Reject::Unsupported { function_code }) => {
                debug!("ignoring function 0x{:02x}", function_code);
            }
            DispatchOutcome::SensorFault(err) => warn!("sensor read failed: {}", err),
            DispatchOutcome::TxFailed(err) => warn!("reply dropped: {}", err),
        }

        if Instant::now() >= next_stats_log {
            next_stats_log += STATS_LOG_PERIOD;
            info!("link stats: {}", LINK_STATS.snapshot());
        }
    }
}
