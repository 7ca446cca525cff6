use crate::dispatcher::Dispatcher;
use chrono::Utc;
use faultline_common::metrics::{
    BusinessMetrics, BusinessPayload, ComponentKind, MetricSnapshot, PowerReadings,
    ThermalReadings,
};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Packet framing: `[component: u8][len: u16 BE][payload: len bytes]`.
const HEADER_LEN: usize = 3;

const DEFAULT_INPUT_CAPACITY: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Bus: packet too short")]
    Truncated,

    #[error("Bus: length mismatch in packet")]
    LengthMismatch,

    #[error("Bus: unknown component 0x{0:02X}")]
    UnknownComponent(u8),

    #[error("Bus: payload too short for component 0x{0:02X}")]
    PayloadTooShort(u8),

    #[error("Bus: input queue full")]
    QueueFull,

    #[error("Bus: receiver stopped")]
    Closed,
}

fn read_u16(payload: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([payload[offset], payload[offset + 1]])
}

/// Millivolt / milliampere fields scale by 1000.
fn milli(payload: &[u8], offset: usize) -> f64 {
    f64::from(read_u16(payload, offset)) / 1000.0
}

/// Temperatures arrive as signed tenths of a degree.
fn deci_temp(payload: &[u8], offset: usize) -> f64 {
    f64::from(read_u16(payload, offset) as i16) / 10.0
}

/// Decode one component-bus packet into a typed snapshot.
pub fn decode_packet(packet: &[u8]) -> Result<BusinessMetrics, BusError> {
    if packet.len() < HEADER_LEN {
        return Err(BusError::Truncated);
    }
    let component_code = packet[0];
    let declared = read_u16(packet, 1) as usize;
    if declared > packet.len() - HEADER_LEN {
        return Err(BusError::LengthMismatch);
    }
    let payload = &packet[HEADER_LEN..HEADER_LEN + declared];

    let component = ComponentKind::from_code(component_code)
        .ok_or(BusError::UnknownComponent(component_code))?;

    let payload = match component {
        ComponentKind::Power => decode_power(payload, component_code)?,
        ComponentKind::Thermal => decode_thermal(payload, component_code)?,
    };

    Ok(BusinessMetrics {
        component,
        timestamp: Utc::now().timestamp(),
        payload,
    })
}

fn decode_power(payload: &[u8], code: u8) -> Result<BusinessPayload, BusError> {
    if payload.len() < 14 {
        return Err(BusError::PayloadTooShort(code));
    }
    Ok(BusinessPayload::Power(PowerReadings {
        supply_module_voltage: milli(payload, 0),
        battery_voltage: milli(payload, 2),
        bus_voltage: milli(payload, 4),
        cpu_board_voltage: milli(payload, 6),
        reference_voltage: milli(payload, 8),
        bracket_current: milli(payload, 10),
        load_current: milli(payload, 12),
    }))
}

fn decode_thermal(payload: &[u8], code: u8) -> Result<BusinessPayload, BusError> {
    if payload.len() < 31 {
        return Err(BusError::PayloadTooShort(code));
    }
    let mut zone_temps = Vec::with_capacity(10);
    for i in 0..10 {
        zone_temps.push(deci_temp(payload, i * 2));
    }
    let switches = payload[30];
    Ok(BusinessPayload::Thermal(ThermalReadings {
        zone_temps,
        battery_temp_1: deci_temp(payload, 20),
        battery_temp_2: deci_temp(payload, 22),
        platform_temp: deci_temp(payload, 24),
        battery_loop_temp: deci_temp(payload, 26),
        tank_loop_temp: deci_temp(payload, 28),
        platform_heater_on: switches & 0x01 != 0,
        battery_heater_on: switches & 0x02 != 0,
        tank_heater_on: switches & 0x04 != 0,
    }))
}

struct ReceiverInner {
    rx: Option<mpsc::Receiver<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
    cancel: CancellationToken,
}

/// Accepts raw bus packets from producer services, decodes them off the
/// caller's thread, and hands the snapshots to the dispatcher.
pub struct BusReceiver {
    dispatcher: Arc<Dispatcher>,
    tx: mpsc::Sender<Vec<u8>>,
    inner: Mutex<ReceiverInner>,
}

impl BusReceiver {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_capacity(dispatcher, DEFAULT_INPUT_CAPACITY)
    }

    pub fn with_capacity(dispatcher: Arc<Dispatcher>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            dispatcher,
            tx,
            inner: Mutex::new(ReceiverInner {
                rx: Some(rx),
                task: None,
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Non-blocking submission of one raw packet. Framing is validated
    /// before the packet is accepted.
    pub fn submit(&self, packet: Vec<u8>) -> Result<(), BusError> {
        if packet.len() < HEADER_LEN {
            return Err(BusError::Truncated);
        }
        match self.tx.try_send(packet) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(BusError::QueueFull),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BusError::Closed),
        }
    }

    pub fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        let Some(mut rx) = inner.rx.take() else {
            return;
        };
        let cancel = inner.cancel.clone();
        let dispatcher = self.dispatcher.clone();

        inner.task = Some(tokio::spawn(async move {
            let handle = |packet: Vec<u8>| match decode_packet(&packet) {
                Ok(metrics) => dispatcher.dispatch(MetricSnapshot::Business(metrics)),
                Err(e) => {
                    tracing::warn!(error = %e, len = packet.len(), "Bus packet rejected");
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        while let Ok(packet) = rx.try_recv() {
                            handle(packet);
                        }
                        return;
                    }
                    maybe_packet = rx.recv() => {
                        let Some(packet) = maybe_packet else { return };
                        handle(packet);
                    }
                }
            }
        }));
    }

    pub async fn stop(&self) {
        let handle = {
            let mut inner = self.inner.lock().unwrap();
            inner.cancel.cancel();
            inner.task.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}
