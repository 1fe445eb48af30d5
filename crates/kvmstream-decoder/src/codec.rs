use kvmstream_core::DecoderError;

/// RFC 6381 codec string, e.g. `avc1.42e01f`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodecId(String);

impl CodecId {
    /// Derives the codec string from an SDP-style `profile_level_id`
    /// (three hex bytes: profile_idc, constraint flags, level_idc).
    pub fn from_profile_level_id(profile_level_id: &str) -> Result<Self, DecoderError> {
        let id = profile_level_id.trim();
        if id.len() != 6 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DecoderError::Unsupported {
                codec: format!("avc1.{id}"),
            });
        }
        Ok(Self(format!("avc1.{}", id.to_ascii_lowercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn byte(&self, index: usize) -> Option<u8> {
        let hex = self.0.strip_prefix("avc1.")?;
        let start = index * 2;
        u8::from_str_radix(hex.get(start..start + 2)?, 16).ok()
    }

    pub fn profile_name(&self) -> &'static str {
        match self.byte(0) {
            Some(0x42) => "Baseline",
            Some(0x4d) => "Main",
            Some(0x58) => "Extended",
            Some(0x64) => "High",
            _ => "Unknown",
        }
    }

    /// Level as `major.minor`, e.g. `3.1` for level_idc 31.
    pub fn level(&self) -> Option<(u8, u8)> {
        self.byte(2).map(|idc| (idc / 10, idc % 10))
    }
}

impl std::fmt::Display for CodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
