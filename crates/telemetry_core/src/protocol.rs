//! Protocolo de linha sobre TCP.
//!
//! Cada frame é um objeto JSON compacto seguido de um único byte delimitador:
//!
//! ```text
//! ┌───────────────────────────┬──────┐
//! │ JSON compacto (N bytes)   │ '\n' │
//! └───────────────────────────┴──────┘
//! ```
//!
//! O JSON escapa caracteres de controle dentro de strings, então o
//! delimitador nunca aparece dentro de um frame. Do lado da recepção, o
//! [`FrameBuffer`] acumula bytes por conexão e corta frames completos.

use crate::types::Envelope;
use serde_json::Value;

/// Byte que termina cada frame.
pub const FRAME_DELIMITER: u8 = b'\n';

/// Tamanho máximo do acumulador por conexão (1 MiB).
pub const MAX_BUFFER_SIZE: usize = 1024 * 1024;

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),

    #[error("Frame não é um objeto JSON")]
    NotAnObject,

    #[error("Frame sem campo \"type\"")]
    MissingType,

    #[error("Tipo de mensagem desconhecido: {0}")]
    UnknownType(String),

    #[error("Buffer estourou: {size} bytes acumulados (limite {limit})")]
    BufferOverflow { size: usize, limit: usize },
}

impl ProtocolError {
    /// Só o estouro de buffer derruba a conexão; o resto descarta um frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProtocolError::BufferOverflow { .. })
    }
}

/// Codifica um [`Envelope`] como frame pronto para o socket.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>, ProtocolError> {
    let mut frame =
        serde_json::to_vec(envelope).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    frame.push(FRAME_DELIMITER);
    Ok(frame)
}

/// Decodifica o conteúdo de um frame (sem o delimitador).
///
/// O discriminador `type` é lido antes de qualquer campo específico; tipos
/// fora de [`Envelope::KNOWN_TYPES`] retornam [`ProtocolError::UnknownType`].
pub fn decode_frame(frame: &[u8]) -> Result<Envelope, ProtocolError> {
    let value: Value =
        serde_json::from_slice(frame).map_err(|e| ProtocolError::Deserialize(e.to_string()))?;

    let kind = value
        .as_object()
        .ok_or(ProtocolError::NotAnObject)?
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingType)?;

    if !Envelope::KNOWN_TYPES.contains(&kind) {
        return Err(ProtocolError::UnknownType(kind.to_owned()));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

// ──────────────────────────────────────────────
// Remontagem de frames
// ──────────────────────────────────────────────

/// Acumulador de bytes de uma conexão.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    /// Bytes já varridos sem encontrar delimitador
    scanned: usize,
    max_size: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_limit(MAX_BUFFER_SIZE)
    }

    pub fn with_limit(max_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            max_size,
        }
    }

    /// Acrescenta bytes e retorna os frames completos, em ordem.
    ///
    /// Frames vazios (dois delimitadores seguidos) são descartados e o
    /// fragmento final fica guardado para a próxima chamada. Se um frame ou o
    /// fragmento final passar do limite retorna
    /// [`ProtocolError::BufferOverflow`]: a conexão deve ser abortada.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, ProtocolError> {
        self.buf.extend_from_slice(bytes);

        let mut frames = Vec::new();
        let mut start = 0;
        let mut pos = self.scanned;
        while let Some(offset) = self.buf[pos..].iter().position(|&b| b == FRAME_DELIMITER) {
            let end = pos + offset;
            if end - start > self.max_size {
                return Err(self.overflow(end - start));
            }
            if end > start {
                frames.push(self.buf[start..end].to_vec());
            }
            start = end + 1;
            pos = start;
        }

        self.buf.drain(..start);
        self.scanned = self.buf.len();

        if self.buf.len() > self.max_size {
            return Err(self.overflow(self.buf.len()));
        }

        Ok(frames)
    }

    fn overflow(&mut self, size: usize) -> ProtocolError {
        self.clear();
        ProtocolError::BufferOverflow {
            size,
            limit: self.max_size,
        }
    }

    /// Bytes pendentes (fragmento sem delimitador).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf = Vec::new();
        self.scanned = 0;
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
