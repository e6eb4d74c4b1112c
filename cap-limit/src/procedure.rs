use sha2::Digest;
use sha2::Sha256;

/// An atomic procedure: one algorithm's check-and-update, run by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Procedure {
    pub name: &'static str,
    pub source: &'static str,
}

impl Procedure {
    /// Stable digest of the source text.
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.source.as_bytes()))
    }
}

pub const FIXED_WINDOW: Procedure = Procedure {
    name: "fixed_window",
    source: include_str!("../lua/fixed_window.lua"),
};

pub const SLIDING_WINDOW: Procedure = Procedure {
    name: "sliding_window",
    source: include_str!("../lua/sliding_window.lua"),
};

pub const SLIDING_WINDOW_LOG: Procedure = Procedure {
    name: "sliding_window_log",
    source: include_str!("../lua/sliding_window_log.lua"),
};

pub const TOKEN_BUCKET: Procedure = Procedure {
    name: "token_bucket",
    source: include_str!("../lua/token_bucket.lua"),
};

pub const LEAKY_BUCKET: Procedure = Procedure {
    name: "leaky_bucket",
    source: include_str!("../lua/leaky_bucket.lua"),
};

pub const GCRA: Procedure = Procedure {
    name: "gcra",
    source: include_str!("../lua/gcra.lua"),
};

pub const ALL: [Procedure; 6] = [
    FIXED_WINDOW,
    SLIDING_WINDOW,
    SLIDING_WINDOW_LOG,
    TOKEN_BUCKET,
    LEAKY_BUCKET,
    GCRA,
];
