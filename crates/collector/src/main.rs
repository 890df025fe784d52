//! # Telemetria Collector
//!
//! Servidor TCP que aceita dispositivos de telemetria, atribui identidades,
//! envia comandos `start`/`stop` e avalia a telemetria recebida contra os
//! tetos de alerta configurados.
//!
//! O operador controla o coletor pelo console (digite `help`).
//!
//! ## Uso
//! ```bash
//! telemetry_collector             # porta 12345
//! telemetry_collector -p 9000
//! ```

mod console;
mod dashboard;
mod events;
mod net_thread;
mod registry;

use clap::Parser;
use dashboard::TelemetryDashboard;
use net_thread::CollectorHandle;
use std::path::PathBuf;
use std::process::ExitCode;
use telemetry_core::config::AppConfig;
use tracing::{error, info, warn};

/// Coletor de telemetria.
#[derive(Debug, Parser)]
#[command(name = "telemetry_collector", version, about)]
struct Args {
    /// Porta de escuta (padrão: 12345)
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

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    if let Some(port) = args.port {
        config.collector.port = port;
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Configuração inválida: {e}");
        }
        return ExitCode::FAILURE;
    }

    let collector_cfg = &config.collector;

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ TELEMETRIA COLLECTOR – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Porta:      {}", collector_cfg.port);
    println!("  Buffer:     {} bytes por conexão", collector_cfg.max_buffer_bytes);
    println!(
        "  Alertas:    latência>{}ms perda>{}% cpu>{}% memória>{}%",
        collector_cfg.thresholds.max_latency,
        collector_cfg.thresholds.max_packet_loss,
        collector_cfg.thresholds.max_cpu_usage,
        collector_cfg.thresholds.max_memory_usage
    );
    println!("══════════════════════════════════════════════");
    println!("  Digite 'help' para ver os comandos.");
    println!();

    // ── Reator ──
    let handle = match CollectorHandle::spawn(collector_cfg) {
        Ok(handle) => handle,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    handle.start_server(collector_cfg.port);

    let input = match console::spawn_stdin_reader() {
        Ok(input) => input,
        Err(e) => {
            error!("Falha ao iniciar console: {e}");
            handle.shutdown();
            return ExitCode::FAILURE;
        }
    };

    let handle = TelemetryDashboard::new(handle, collector_cfg.port).run(input);
    handle.shutdown();
    info!("Coletor finalizado");
    ExitCode::SUCCESS
}
