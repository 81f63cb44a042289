pub mod hybi00;
pub mod rfc6455;

/// Which wire format a negotiated connection speaks. HYBI07 and HYBI10
/// share RFC6455's frame shape exactly (only the handshake differs), so
/// they're dispatched through the same codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Draft {
    Hixie75,
    Hybi00,
    Hybi07,
    Hybi10,
    Rfc6455,
}

impl Draft {
    pub fn uses_byte_stuffed_framing(&self) -> bool {
        matches!(self, Draft::Hixie75 | Draft::Hybi00)
    }
}
