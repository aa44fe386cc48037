//! Wi-Fi station, IP stack, SNTP time sync and the metrics HTTP server

use alloc::string::String;

use airmon_core::clock::EmbassyClock;
use airmon_core::config::InternetConfig;
use airmon_core::http::{ExportError, Exporter, Outcome, head_complete};
use airmon_core::metrics::Gauge;
use airmon_core::sntp;
use embassy_futures::select::{Either, select};
use embassy_net::dns::DnsQueryType;
use embassy_net::tcp::{self, TcpSocket};
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_net::{Runner, Stack};
use embassy_time::{Duration, Timer, with_timeout};
use embedded_io_async::{ErrorKind, ErrorType, Write};
use esp_radio::wifi::{
    ClientConfig, ModeConfig, WifiController, WifiDevice, WifiEvent, WifiStaState,
};
use log::{debug, error, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const RSSI_INTERVAL: Duration = Duration::from_secs(10);
const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

const NTP_TIMEOUT: Duration = Duration::from_secs(5);
const NTP_RETRY_DELAY: Duration = Duration::from_secs(10);
const NTP_RESYNC_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Request heads longer than this are answered from what fits.
const HEAD_BUF_LEN: usize = 512;

/// Keep the station associated and sample RSSI while connected.
#[embassy_executor::task]
pub async fn connection(
    mut controller: WifiController<'static>,
    internet: InternetConfig<'static>,
    wifi_rssi: &'static Gauge,
) {
    info!("Wi-Fi connection task started");
    loop {
        if esp_radio::wifi::sta_state() == WifiStaState::Connected {
            match select(
                controller.wait_for_event(WifiEvent::StaDisconnected),
                Timer::after(RSSI_INTERVAL),
            )
            .await
            {
                Either::First(()) => {
                    warn!("Wi-Fi disconnected");
                    Timer::after(RECONNECT_DELAY).await;
                }
                Either::Second(()) => sample_rssi(&mut controller, wifi_rssi),
            }
            continue;
        }

        if !matches!(controller.is_started(), Ok(true)) {
            let client = ClientConfig::default()
                .with_ssid(String::from(internet.ssid))
                .with_password(String::from(internet.password));
            if let Err(e) = controller.set_config(&ModeConfig::Client(client)) {
                error!("Wi-Fi configuration rejected: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
            info!("Starting Wi-Fi");
            if let Err(e) = controller.start_async().await {
                error!("Wi-Fi failed to start: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
                continue;
            }
        }

        info!("Connecting to {}", internet.ssid);
        match controller.connect_async().await {
            Ok(()) => {
                info!("Wi-Fi connected");
                sample_rssi(&mut controller, wifi_rssi);
            }
            Err(e) => {
                warn!("Wi-Fi connect failed: {:?}", e);
                Timer::after(RECONNECT_DELAY).await;
            }
        }
    }
}

fn sample_rssi(controller: &mut WifiController<'static>, wifi_rssi: &Gauge) {
    match controller.rssi() {
        Ok(rssi) => {
            if let Err(e) = wifi_rssi.set(&[], f64::from(rssi)) {
                error!("Failed to record RSSI: {}", e);
            }
        }
        Err(e) => debug!("RSSI unavailable: {:?}", e),
    }
}

#[embassy_executor::task]
pub async fn net_runner(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

/// Set the wall clock over SNTP once the network is up, then keep it corrected.
#[embassy_executor::task]
pub async fn time_sync(stack: Stack<'static>, clock: &'static EmbassyClock) {
    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_buffer = [0u8; 128];

    stack.wait_config_up().await;

    loop {
        let mut socket = UdpSocket::new(
            stack,
            &mut rx_meta,
            &mut rx_buffer,
            &mut tx_meta,
            &mut tx_buffer,
        );

        let next = match query_ntp(stack, &mut socket).await {
            Ok(unix_ms) => {
                clock.synchronize(unix_ms);
                NTP_RESYNC_INTERVAL
            }
            Err(e) => {
                warn!("Time sync failed: {}", e);
                if clock.is_synchronized() {
                    NTP_RESYNC_INTERVAL
                } else {
                    NTP_RETRY_DELAY
                }
            }
        };

        drop(socket);
        Timer::after(next).await;
    }
}

async fn query_ntp(stack: Stack<'static>, socket: &mut UdpSocket<'_>) -> Result<u64, &'static str> {
    let servers = stack
        .dns_query(sntp::DEFAULT_SERVER, DnsQueryType::A)
        .await
        .map_err(|e| {
            debug!("Resolving {} failed: {:?}", sntp::DEFAULT_SERVER, e);
            "DNS lookup failed"
        })?;
    let server = *servers.first().ok_or("NTP server has no address")?;

    socket.bind(0).map_err(|_| "UDP bind failed")?;
    socket
        .send_to(&sntp::request(), (server, sntp::NTP_PORT))
        .await
        .map_err(|_| "request not sent")?;

    let mut reply = [0u8; sntp::PACKET_LEN];
    let (len, _) = with_timeout(NTP_TIMEOUT, socket.recv_from(&mut reply))
        .await
        .map_err(|_| "no reply")?
        .map_err(|_| "reply not received")?;

    sntp::parse_reply(&reply[..len]).map_err(|e| {
        debug!("Rejected NTP reply from {}: {}", server, e);
        "invalid reply"
    })
}

/// Serve one connection at a time on `port`.
#[embassy_executor::task]
pub async fn http_server(stack: Stack<'static>, exporter: &'static Exporter<'static>, port: u16) {
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 4096];

    stack.wait_config_up().await;
    if let Some(config) = stack.config_v4() {
        info!("Serving metrics on http://{}:{}", config.address.address(), port);
    }

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        if let Err(e) = socket.accept(port).await {
            warn!("Accept failed: {:?}", e);
            continue;
        }

        match read_head(&mut socket).await {
            Ok((head, len)) => {
                let mut writer = SocketWriter(&mut socket);
                match exporter.handle(&head[..len], &mut writer).await {
                    Ok(Outcome::Scraped(stats)) if stats.truncated > 0 => {
                        warn!("{} collectors were truncated", stats.truncated)
                    }
                    Ok(outcome) => debug!("Request handled: {:?}", outcome),
                    Err(ExportError::Io { kind }) => warn!("Response aborted: {:?}", kind),
                }
            }
            Err(e) => warn!("Failed to read request: {:?}", e),
        }

        socket.close();
        let _ = socket.flush().await;
        socket.abort();
    }
}

async fn read_head(socket: &mut TcpSocket<'_>) -> Result<([u8; HEAD_BUF_LEN], usize), tcp::Error> {
    let mut head = [0u8; HEAD_BUF_LEN];
    let mut len = 0;
    while len < head.len() {
        let read = socket.read(&mut head[len..]).await?;
        if read == 0 {
            break;
        }
        len += read;
        if head_complete(&head[..len]) {
            break;
        }
    }
    Ok((head, len))
}

/// Adapts the socket's own write methods to the exporter's sink trait.
struct SocketWriter<'s, 'b>(&'s mut TcpSocket<'b>);

impl ErrorType for SocketWriter<'_, '_> {
    type Error = ErrorKind;
}

impl Write for SocketWriter<'_, '_> {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.0.write(buf).await.map_err(socket_error)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.flush().await.map_err(socket_error)
    }
}

fn socket_error(e: tcp::Error) -> ErrorKind {
    match e {
        tcp::Error::ConnectionReset => ErrorKind::ConnectionReset,
        #[allow(unreachable_patterns)]
        _ => ErrorKind::Other,
    }
}
