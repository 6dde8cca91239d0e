use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 附加说明的最大字符数，超出部分截断
pub const MAX_NOTE_CHARS: usize = 500;

/// 支持的输入图片类型
pub const SUPPORTED_MIME_TYPES: &[&str] = &["image/png", "image/jpeg", "image/webp"];

pub const DEFAULT_MIME_TYPE: &str = "image/png";

/// 重绘风格
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    #[default]
    Clean,
    Shadow,
}

impl Style {
    pub fn as_str(&self) -> &'static str {
        match self {
            Style::Clean => "clean",
            Style::Shadow => "shadow",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            Style::Clean => {
                "Transforme essa tatuagem em um desenho limpo sobre fundo branco sólido. \
                 Remova totalmente pele, sombras, reflexos, textura e qualquer fundo. \
                 Corrija perspectiva e rotação. Complete partes faltantes mantendo o estilo \
                 original. Alta fidelidade."
            }
            Style::Shadow => {
                "Crie um decalque de tatuagem com linhas pretas e sombras leves, sem pele, \
                 sem textura, fundo branco sólido. Corrija perspectiva e complete áreas \
                 ocultas mantendo o estilo."
            }
        }
    }
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Style {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clean" => Ok(Style::Clean),
            "shadow" => Ok(Style::Shadow),
            other => Err(format!("unsupported style: {}", other)),
        }
    }
}

/// 规范化图片类型，不支持时返回 `None`
pub fn normalize_mime_type(mime_type: &str) -> Option<&'static str> {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    let mime_type = if mime_type == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        mime_type
    };
    SUPPORTED_MIME_TYPES
        .iter()
        .copied()
        .find(|supported| *supported == mime_type)
}

/// 截断并清理客户端附加说明，空白说明视为未提供
pub fn normalize_note(note: Option<&str>) -> Option<String> {
    note.map(str::trim)
        .filter(|n| !n.is_empty())
        .map(|n| n.chars().take(MAX_NOTE_CHARS).collect())
}

/// 生成发送给模型的提示词
pub fn build_prompt(style: Style, note: Option<&str>) -> String {
    match note {
        Some(note) => format!("{}\n\nObservações do cliente: {}", style.prompt(), note),
        None => style.prompt().to_string(),
    }
}
