#![no_std]
#![no_main]

use core::cell::Cell;

use defmt::{debug, info, warn};
use defmt_rtt as _;
use doncon_rp2040::{
    configure_usb_cdc, lines, AdcSampler, ConfigHandler, DeviceRequest, FlashSettingsStore,
    SerialError, SettingsStore, UsbSerial, MAX_PACKET_SIZE, SETTINGS,
};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_rp::adc::{Adc, Channel as AdcChannel, Config as AdcConfig};
use embassy_rp::bind_interrupts;
use embassy_rp::flash::Flash;
use embassy_rp::gpio::Pull;
use embassy_rp::peripherals::USB;
use embassy_rp::usb::Driver;
use embassy_time::{Duration, Instant, Ticker};
use embassy_usb::class::cdc_acm::State;
use embassy_usb::{Builder, Config as UsbConfig};
use heapless::String;
use static_cell::StaticCell;

#[cfg(feature = "dev-panic")]
use panic_probe as _;
#[cfg(feature = "prod-panic")]
use panic_reset as _;

bind_interrupts!(struct Irqs {
    USBCTRL_IRQ => embassy_rp::usb::InterruptHandler<USB>;
});

/// Sensor sampling period while streaming.
const SAMPLE_PERIOD_MS: u64 = 1;

/// Reply buffer for one inbound token; a full read-all fits comfortably.
const OUTPUT_CAPACITY: usize = 1024;

/// USB device configuration buffer.
static CONFIG_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static BOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static MSOS_DESCRIPTOR: StaticCell<[u8; 256]> = StaticCell::new();
static CONTROL_BUF: StaticCell<[u8; 64]> = StaticCell::new();

/// CDC ACM state.
static CDC_STATE: StaticCell<State> = StaticCell::new();

type Serial = UsbSerial<'static, Driver<'static, USB>>;

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("DonCon starting...");

    let p = embassy_rp::init(embassy_rp::config::Config::default());

    // --- Settings ---
    let store = FlashSettingsStore::new(Flash::new_blocking(p.FLASH));
    SETTINGS.signal(*store.settings());

    // --- Sensors ---
    let adc = Adc::new_blocking(p.ADC, AdcConfig::default());
    let sampler = AdcSampler::new(
        adc,
        AdcChannel::new_pin(p.PIN_26, Pull::None), // Don Left
        AdcChannel::new_pin(p.PIN_27, Pull::None), // Ka Left
        AdcChannel::new_pin(p.PIN_28, Pull::None), // Don Right
        AdcChannel::new_pin(p.PIN_29, Pull::None), // Ka Right
    );

    // --- USB Setup ---
    let usb_driver = Driver::new(p.USB, Irqs);

    let mut usb_config = UsbConfig::new(0x1209, 0x3902); // pid.codes VID
    usb_config.manufacturer = Some("DonCon");
    usb_config.product = Some("DonCon Drum Configuration");
    usb_config.serial_number = Some("001");
    usb_config.max_power = 100;
    usb_config.max_packet_size_0 = 64;

    let config_descriptor = CONFIG_DESCRIPTOR.init([0; 256]);
    let bos_descriptor = BOS_DESCRIPTOR.init([0; 256]);
    let msos_descriptor = MSOS_DESCRIPTOR.init([0; 256]);
    let control_buf = CONTROL_BUF.init([0; 64]);

    let mut builder = Builder::new(
        usb_driver,
        usb_config,
        config_descriptor,
        bos_descriptor,
        msos_descriptor,
        control_buf,
    );

    let cdc_state = CDC_STATE.init(State::new());
    let class = configure_usb_cdc(&mut builder, cdc_state);

    let usb_device = builder.build();
    let serial = UsbSerial::new(class);

    // Spawn tasks (unwrap the SpawnToken, then spawn)
    spawner.spawn(usb_task(usb_device).unwrap());
    spawner.spawn(config_task(serial, store, sampler).unwrap());
    spawner.spawn(settings_task().unwrap());

    info!("DonCon initialized, waiting for configurator...");
}

/// USB device task - runs the USB stack.
#[embassy_executor::task]
async fn usb_task(mut device: embassy_usb::UsbDevice<'static, Driver<'static, USB>>) {
    device.run().await;
}

/// Configuration task - serves one configurator session at a time.
#[embassy_executor::task]
async fn config_task(
    mut serial: Serial,
    store: FlashSettingsStore<'static>,
    mut sampler: AdcSampler<'static>,
) {
    let applied = Cell::new(false);
    let mut handler = ConfigHandler::with_settings_applied(store, || applied.set(true));

    loop {
        serial.wait_connection().await;
        info!("configurator connected");

        let result = serve(&mut serial, &mut handler, &mut sampler, &applied).await;
        handler.reset();
        match result {
            Err(SerialError::Disconnected) => info!("configurator disconnected"),
            Err(e) => warn!("serial error: {:?}", e),
            Ok(()) => {}
        }
    }
}

/// Settings task - picks up applied settings.
#[embassy_executor::task]
async fn settings_task() {
    loop {
        let settings = SETTINGS.wait().await;
        debug!("settings applied: {:?}", settings);
    }
}

/// Run the protocol until the host goes away.
async fn serve<F: FnMut()>(
    serial: &mut Serial,
    handler: &mut ConfigHandler<FlashSettingsStore<'static>, F>,
    sampler: &mut AdcSampler<'static>,
    applied: &Cell<bool>,
) -> Result<(), SerialError> {
    let mut rx = [0u8; MAX_PACKET_SIZE];
    let mut out: String<OUTPUT_CAPACITY> = String::new();
    let mut ticker = Ticker::every(Duration::from_millis(SAMPLE_PERIOD_MS));

    loop {
        match select(serial.read_chunk(&mut rx), ticker.next()).await {
            Either::First(chunk) => {
                let chunk = chunk?;
                for line in lines(chunk) {
                    out.clear();
                    let request = match handler.process_line(line, now_ms(), &mut out) {
                        Ok(request) => request,
                        Err(e) => {
                            warn!("command failed: {:?}", e);
                            None
                        }
                    };
                    publish_if_applied(handler, applied);
                    flush(serial, &out).await?;

                    if let Some(DeviceRequest::RebootToBootloader) = request {
                        reboot_to_bootsel();
                    }
                }
            }
            Either::Second(()) => {
                if !serial.is_connected() {
                    return Err(SerialError::Disconnected);
                }
                if !handler.is_streaming() {
                    continue;
                }

                out.clear();
                match sampler.sample() {
                    Ok(snapshot) => {
                        if let Err(e) =
                            handler.send_sensor_data_if_streaming(&snapshot, now_ms(), &mut out)
                        {
                            warn!("telemetry dropped: {:?}", e);
                        }
                    }
                    Err(e) => warn!("adc error: {:?}", e),
                }
                flush(serial, &out).await?;
            }
        }
    }
}

fn publish_if_applied<F: FnMut()>(
    handler: &ConfigHandler<FlashSettingsStore<'static>, F>,
    applied: &Cell<bool>,
) {
    if applied.replace(false) {
        SETTINGS.signal(*handler.store().settings());
    }
}

async fn flush(serial: &mut Serial, out: &str) -> Result<(), SerialError> {
    if out.is_empty() {
        return Ok(());
    }
    serial.write_all(out.as_bytes()).await
}

#[inline]
fn now_ms() -> u64 {
    Instant::now().as_millis()
}

fn reboot_to_bootsel() -> ! {
    info!("rebooting to BOOTSEL");
    #[allow(unused_unsafe)]
    unsafe {
        embassy_rp::rom_data::reset_to_usb_boot(0, 0);
    }
    loop {
        cortex_m::asm::wfi();
    }
}
