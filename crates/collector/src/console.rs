//! Console do operador – comandos lidos do stdin.

use crossbeam_channel::Receiver;
use std::io::{self, BufRead};
use std::thread;
use telemetry_core::alerts::Metric;
use telemetry_core::config::ThresholdConfig;
use telemetry_core::types::ClientId;

pub const HELP: &str = "\
Comandos:
  start <id|all>         envia start a um cliente ou a todos
  stop <id|all>          envia stop a um cliente ou a todos
  list                   lista as sessões conectadas
  thresholds             mostra os tetos de alerta
  set <métrica> <valor>  altera um teto (latency, packet_loss, cpu, memory)
  listen [porta]         inicia o servidor
  halt                   para o servidor e desconecta todos
  help                   mostra esta ajuda
  quit                   encerra o coletor";

/// Alvo de start/stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    All,
    Client(ClientId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Start(Target),
    Stop(Target),
    List,
    ShowThresholds,
    Set(Metric, f64),
    Listen(Option<u16>),
    Halt,
    Help,
    Quit,
}

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConsoleError {
    #[error("Comando vazio")]
    Empty,

    #[error("Comando desconhecido: {0} (digite 'help')")]
    Unknown(String),

    #[error("Uso: {0}")]
    Usage(&'static str),

    #[error("Valor inválido: {0}")]
    InvalidValue(String),

    #[error("Métrica desconhecida: {0}")]
    UnknownMetric(String),
}

/// Interpreta uma linha do console.
pub fn parse(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err(ConsoleError::Empty);
    };
    let args: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("start", [target]) => ConsoleCommand::Start(parse_target(target)?),
        ("start", _) => return Err(ConsoleError::Usage("start <id|all>")),
        ("stop", [target]) => ConsoleCommand::Stop(parse_target(target)?),
        ("stop", _) => return Err(ConsoleError::Usage("stop <id|all>")),
        ("list", []) => ConsoleCommand::List,
        ("thresholds", []) => ConsoleCommand::ShowThresholds,
        ("set", [metric, value]) => {
            let metric = parse_metric(metric)?;
            let value: f64 = value
                .parse()
                .map_err(|_| ConsoleError::InvalidValue(value.to_string()))?;
            if !value.is_finite() || value < 0.0 {
                return Err(ConsoleError::InvalidValue(value.to_string()));
            }
            ConsoleCommand::Set(metric, value)
        }
        ("set", _) => return Err(ConsoleError::Usage("set <métrica> <valor>")),
        ("listen", []) => ConsoleCommand::Listen(None),
        ("listen", [port]) => ConsoleCommand::Listen(Some(
            port.parse()
                .map_err(|_| ConsoleError::InvalidValue(port.to_string()))?,
        )),
        ("halt", []) => ConsoleCommand::Halt,
        ("help" | "?", []) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        ("list" | "thresholds" | "listen" | "halt" | "help" | "?" | "quit" | "exit", _) => {
            return Err(ConsoleError::Usage("sem argumentos extras"));
        }
        (other, _) => return Err(ConsoleError::Unknown(other.to_string())),
    };
    Ok(command)
}

fn parse_target(word: &str) -> Result<Target, ConsoleError> {
    if word.eq_ignore_ascii_case("all") {
        return Ok(Target::All);
    }
    word.parse()
        .map(Target::Client)
        .map_err(|_| ConsoleError::InvalidValue(word.to_string()))
}

fn parse_metric(word: &str) -> Result<Metric, ConsoleError> {
    match word.to_ascii_lowercase().as_str() {
        "latency" => Ok(Metric::Latency),
        "packet_loss" | "loss" => Ok(Metric::PacketLoss),
        "cpu" | "cpu_usage" => Ok(Metric::CpuUsage),
        "memory" | "mem" | "memory_usage" => Ok(Metric::MemoryUsage),
        _ => Err(ConsoleError::UnknownMetric(word.to_string())),
    }
}

/// Nova configuração com um único teto trocado.
///
/// Tetos inteiros (CPU/memória) são arredondados para baixo.
pub fn with_threshold(mut config: ThresholdConfig, metric: Metric, value: f64) -> ThresholdConfig {
    match metric {
        Metric::Latency => config.max_latency = value,
        Metric::PacketLoss => config.max_packet_loss = value,
        Metric::CpuUsage => config.max_cpu_usage = value as u32,
        Metric::MemoryUsage => config.max_memory_usage = value as u32,
    }
    config
}

/// Lê o stdin numa thread própria; o canal fecha no EOF.
pub fn spawn_stdin_reader() -> io::Result<Receiver<String>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("console-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_targets() {
        assert_eq!(parse("start all"), Ok(ConsoleCommand::Start(Target::All)));
        assert_eq!(parse("STOP 7"), Ok(ConsoleCommand::Stop(Target::Client(7))));
        assert_eq!(parse("  start   3  "), Ok(ConsoleCommand::Start(Target::Client(3))));
        assert!(matches!(parse("start abc"), Err(ConsoleError::InvalidValue(_))));
        assert!(matches!(parse("stop"), Err(ConsoleError::Usage(_))));
    }

    #[test]
    fn parses_threshold_changes() {
        assert_eq!(
            parse("set cpu 75"),
            Ok(ConsoleCommand::Set(Metric::CpuUsage, 75.0))
        );
        assert_eq!(
            parse("set latency 250.5"),
            Ok(ConsoleCommand::Set(Metric::Latency, 250.5))
        );
        assert!(matches!(parse("set disk 10"), Err(ConsoleError::UnknownMetric(_))));
        assert!(matches!(parse("set cpu -1"), Err(ConsoleError::InvalidValue(_))));
        assert!(matches!(parse("set cpu"), Err(ConsoleError::Usage(_))));
    }

    #[test]
    fn parses_server_control() {
        assert_eq!(parse("listen"), Ok(ConsoleCommand::Listen(None)));
        assert_eq!(parse("listen 9000"), Ok(ConsoleCommand::Listen(Some(9000))));
        assert!(matches!(parse("listen 70000"), Err(ConsoleError::InvalidValue(_))));
        assert_eq!(parse("halt"), Ok(ConsoleCommand::Halt));
        assert_eq!(parse("list"), Ok(ConsoleCommand::List));
        assert_eq!(parse("quit"), Ok(ConsoleCommand::Quit));
        assert!(matches!(parse("halt now"), Err(ConsoleError::Usage(_))));
    }

    #[test]
    fn rejects_empty_and_unknown() {
        assert_eq!(parse("   "), Err(ConsoleError::Empty));
        assert_eq!(parse("reboot"), Err(ConsoleError::Unknown("reboot".into())));
    }

    #[test]
    fn threshold_change_keeps_other_ceilings() {
        let base = ThresholdConfig::default();
        let changed = with_threshold(base, Metric::MemoryUsage, 80.9);
        assert_eq!(changed.max_memory_usage, 80);
        assert_eq!(changed.max_cpu_usage, base.max_cpu_usage);
        assert_eq!(changed.max_latency, base.max_latency);
        assert_eq!(changed.max_packet_loss, base.max_packet_loss);
    }
}
