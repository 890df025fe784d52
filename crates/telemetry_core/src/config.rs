//! Configuração unificada via TOML.
//!
//! Um único `config.toml` com uma seção para o dispositivo e outra para o
//! coletor. Campos ausentes assumem o valor padrão.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::protocol::MAX_BUFFER_SIZE;

/// Porta TCP padrão do coletor.
pub const DEFAULT_PORT: u16 = 12345;

/// Erros ao gravar a configuração.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Erro ao serializar configuração: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Erro ao gravar {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuração do dispositivo simulado.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Host do coletor
    pub host: String,
    /// Porta TCP do coletor
    pub port: u16,
    /// Espera fixa antes de reconectar (ms)
    pub reconnect_interval_ms: u64,
    /// Menor atraso entre envios (ms)
    pub min_send_interval_ms: u64,
    /// Maior atraso entre envios (ms)
    pub max_send_interval_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: DEFAULT_PORT,
            reconnect_interval_ms: 5000,
            min_send_interval_ms: 10,
            max_send_interval_ms: 100,
        }
    }
}

impl DeviceConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// Tetos de alerta do coletor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Latência máxima (ms)
    pub max_latency: f64,
    /// Perda de pacotes máxima (%)
    pub max_packet_loss: f64,
    /// Uso de CPU máximo (%)
    pub max_cpu_usage: u32,
    /// Uso de memória máximo (%)
    pub max_memory_usage: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            max_latency: 100.0,
            max_packet_loss: 5.0,
            max_cpu_usage: 90,
            max_memory_usage: 90,
        }
    }
}

/// Configuração do coletor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Porta TCP de escuta
    pub port: u16,
    /// Limite do buffer de recepção por conexão (bytes)
    pub max_buffer_bytes: usize,
    /// Thresholds de alerta iniciais
    pub thresholds: ThresholdConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_buffer_bytes: MAX_BUFFER_SIZE,
            thresholds: ThresholdConfig::default(),
        }
    }
}

/// Configuração raiz (unifica dispositivo e coletor).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub collector: CollectorConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.device.host.trim().is_empty() {
            errors.push("Host do dispositivo não pode ser vazio".into());
        }
        if self.device.port == 0 {
            errors.push("Porta do dispositivo não pode ser 0".into());
        }
        if self.device.reconnect_interval_ms == 0 {
            errors.push("Intervalo de reconexão não pode ser 0".into());
        }
        if self.device.min_send_interval_ms > self.device.max_send_interval_ms {
            errors.push(format!(
                "Intervalo de envio inválido: {}–{} ms",
                self.device.min_send_interval_ms, self.device.max_send_interval_ms
            ));
        }
        if self.collector.max_buffer_bytes == 0 {
            errors.push("Limite de buffer do coletor não pode ser 0".into());
        }
        let t = &self.collector.thresholds;
        if t.max_latency < 0.0 || t.max_packet_loss < 0.0 {
            errors.push("Thresholds não podem ser negativos".into());
        }

        errors
    }
}
