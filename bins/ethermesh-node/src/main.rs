//! Ethermesh reference host
//!
//! Minimal embedding of the node core: a UDP socket for the wire, a
//! directory of files for the data store, and log output in place of a tap
//! device. The main loop feeds received datagrams to the core and runs the
//! background pass whenever the core's deadline arrives.

use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ethermesh_core::{
    version, DataChunk, Event, HostHooks, Mac, Node, NodeConfig, VirtualNetworkConfigOperation,
    VirtualNetworkSnapshot,
};

/// Ethermesh node host
#[derive(Parser)]
#[command(name = "ethermesh-node")]
#[command(author, version, about)]
struct Cli {
    /// UDP listen address for overlay transport
    #[arg(short, long, default_value = "0.0.0.0:9993")]
    listen: String,

    /// Directory for persisted node state
    #[arg(short, long, default_value = "./ethermesh-data")]
    data_dir: PathBuf,

    /// Networks to join at startup (64-bit ids, hex)
    #[arg(short, long)]
    join: Vec<String>,

    /// Root topology override file (trusted as-is)
    #[arg(long)]
    root_topology: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// File-backed data store plus UDP wire, implementing the core's hooks
struct FileHost {
    data_dir: PathBuf,
    socket: Arc<UdpSocket>,
}

impl FileHost {
    fn blob_path(&self, name: &str) -> Option<PathBuf> {
        // Blob names are flat; anything path-like is refused.
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            warn!(name, "refusing path-like data store name");
            return None;
        }
        Some(self.data_dir.join(name))
    }
}

impl HostHooks for FileHost {
    fn data_store_get(&self, name: &str, read_offset: u64) -> Option<DataChunk> {
        let path = self.blob_path(name)?;
        let blob = fs::read(path).ok()?;
        let offset = read_offset as usize;
        if offset > blob.len() {
            return None;
        }
        Some(DataChunk {
            data: blob[offset..].to_vec(),
            total_len: blob.len() as u64,
        })
    }

    fn data_store_put(&self, name: &str, data: &[u8], secure: bool) -> bool {
        let Some(path) = self.blob_path(name) else {
            return false;
        };
        let tmp = path.with_extension("tmp");
        if fs::write(&tmp, data).is_err() {
            return false;
        }
        #[cfg(unix)]
        if secure {
            use std::os::unix::fs::PermissionsExt;
            if fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600)).is_err() {
                let _ = fs::remove_file(&tmp);
                return false;
            }
        }
        fs::rename(&tmp, &path).is_ok()
    }

    fn wire_packet_send(&self, remote: SocketAddr, link_desperation: u32, data: &[u8]) -> bool {
        match self.socket.try_send_to(data, remote) {
            Ok(_) => true,
            Err(e) => {
                debug!(%remote, link_desperation, "wire send failed: {}", e);
                false
            }
        }
    }

    fn virtual_network_frame(
        &self,
        nwid: u64,
        source_mac: Mac,
        dest_mac: Mac,
        ether_type: u16,
        _vlan_id: u16,
        data: &[u8],
    ) {
        // No tap device in the reference host; frames are only logged.
        info!(
            nwid = format_args!("{:#018x}", nwid),
            %source_mac, %dest_mac, ether_type,
            len = data.len(),
            "virtual network frame"
        );
    }

    fn virtual_network_config(
        &self,
        nwid: u64,
        op: VirtualNetworkConfigOperation,
        config: &VirtualNetworkSnapshot,
    ) {
        info!(
            nwid = format_args!("{:#018x}", nwid),
            ?op,
            config = %serde_json::to_string(config).unwrap_or_default(),
            "network configuration changed"
        );
    }

    fn status_event(&self, event: Event) {
        info!(?event, "status event");
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = cli.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating data dir {}", cli.data_dir.display()))?;

    let socket = Arc::new(
        UdpSocket::bind(&cli.listen)
            .await
            .with_context(|| format!("binding {}", cli.listen))?,
    );
    info!("listening on {}", socket.local_addr()?);

    let override_topology = match &cli.root_topology {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?,
        ),
        None => None,
    };

    let host = Arc::new(FileHost {
        data_dir: cli.data_dir.clone(),
        socket: Arc::clone(&socket),
    });

    let node = match Node::new(
        now_ms(),
        Arc::clone(&host) as Arc<dyn HostHooks>,
        NodeConfig::default(),
        override_topology.as_deref(),
    ) {
        Ok(node) => Arc::new(node),
        Err(e) => bail!("node construction failed: {e}"),
    };

    let v = version();
    info!(
        "node {} up (ethermesh {}.{}.{}, features {:#x})",
        node.address(),
        v.major,
        v.minor,
        v.revision,
        v.feature_flags
    );

    for nwid_hex in &cli.join {
        let nwid = u64::from_str_radix(nwid_hex.trim_start_matches("0x"), 16)
            .with_context(|| format!("parsing network id {nwid_hex:?}"))?;
        let rc = node.join(nwid);
        info!(nwid = format_args!("{:#018x}", nwid), ?rc, "join requested");
    }

    run(node, socket).await
}

async fn run(node: Arc<Node>, socket: Arc<UdpSocket>) -> Result<()> {
    let mut deadline = 0u64;
    let mut buf = [0u8; 4096];

    loop {
        let now = now_ms();
        let wait = Duration::from_millis(deadline.saturating_sub(now).max(1));

        tokio::select! {
            received = tokio::time::timeout(wait, socket.recv_from(&mut buf)) => {
                match received {
                    Ok(Ok((len, from))) => {
                        let rc = node.process_wire_packet(now_ms(), from, 0, &buf[..len], &mut deadline);
                        if rc.is_fatal() {
                            bail!("fatal result from wire intake: {rc:?}");
                        }
                    }
                    Ok(Err(e)) => warn!("receive error: {}", e),
                    Err(_) => {
                        let rc = node.process_background_tasks(now_ms(), &mut deadline);
                        if rc.is_fatal() {
                            bail!("fatal result from background pass: {rc:?}");
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let status = node.status();
                info!(
                    status = %serde_json::to_string(&status).unwrap_or_default(),
                    "shutting down"
                );
                return Ok(());
            }
        }
    }
}
