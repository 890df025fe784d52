//! # Telemetria Device
//!
//! Dispositivo simulado: conecta ao coletor via TCP, aguarda confirmação e o
//! comando `start`, e então envia telemetria aleatória (rede, status e logs)
//! com intervalos variáveis. Reconecta sozinho se a conexão cair.
//!
//! ## Uso
//! ```bash
//! telemetry_device                          # localhost:12345
//! telemetry_device --host 10.0.0.5 -p 9000
//! ```

mod connection;
mod generator;
mod session;

use clap::Parser;
use connection::DeviceClient;
use std::path::PathBuf;
use std::process::ExitCode;
use telemetry_core::config::AppConfig;
use tracing::{error, info, warn};

/// Dispositivo de telemetria simulado.
#[derive(Debug, Parser)]
#[command(name = "telemetry_device", version, about)]
struct Args {
    /// Host do coletor (padrão: localhost)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Porta do coletor (padrão: 12345)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Caminho do config.toml (padrão: ao lado do executável)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    // ── Config ──
    let config_path = args.config.unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    if let Some(host) = args.host {
        config.device.host = host;
    }
    if let Some(port) = args.port {
        config.device.port = port;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Configuração inválida: {e}");
        }
        return ExitCode::FAILURE;
    }

    let device_cfg = &config.device;

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ TELEMETRIA DEVICE – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Coletor:    {}:{}", device_cfg.host, device_cfg.port);
    println!(
        "  Envio:      {}–{} ms",
        device_cfg.min_send_interval_ms, device_cfg.max_send_interval_ms
    );
    println!("  Reconexão:  {} ms", device_cfg.reconnect_interval_ms);
    println!("══════════════════════════════════════════════");
    println!();

    // ── Reator (thread única) ──
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("Falha ao criar runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut client = DeviceClient::new(device_cfg);
    runtime.block_on(client.run(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C recebido"),
            Err(e) => {
                warn!("Sem suporte a Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
        }
    }));

    info!("Dispositivo finalizado (estado: {})", client.state());
    ExitCode::SUCCESS
}
