// Entity identifiers and small enums shared across the sim.
//
// IDs are UUID v4 values drawn from the engine's `GameRng`, wrapped in one
// newtype per entity kind so a `TaskId` can never be passed where a `UnitId`
// is expected. They serialize as 8-4-4-4-12 strings, which lets them key JSON
// objects in the save file.
//
// **Critical constraint: determinism.** Never mint IDs from OS entropy.

use crate::prng::GameRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// SimUuid
// ---------------------------------------------------------------------------

/// A version-4 UUID generated from the sim PRNG.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimUuid([u8; 16]);

impl SimUuid {
    pub fn new_v4(rng: &mut GameRng) -> Self {
        let mut bytes = rng.next_128_bits();
        // Version nibble 0100, variant bits 10.
        bytes[6] = (bytes[6] & 0x0F) | 0x40;
        bytes[8] = (bytes[8] & 0x3F) | 0x80;
        Self(bytes)
    }

    /// Parse the hyphenated hex form. Hyphens are optional.
    pub fn parse(s: &str) -> Option<Self> {
        let hex: Vec<u8> = s.bytes().filter(|b| *b != b'-').collect();
        if hex.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        if !hex.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        for (i, pair) in hex.chunks(2).enumerate() {
            let text = std::str::from_utf8(pair).ok()?;
            bytes[i] = u8::from_str_radix(text, 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl Serialize for SimUuid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SimUuid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SimUuid::parse(&s).ok_or_else(|| serde::de::Error::custom("invalid UUID format"))
    }
}

impl fmt::Debug for SimUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimUuid({self})")
    }
}

impl fmt::Display for SimUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if matches!(i, 4 | 6 | 8 | 10) {
                f.write_str("-")?;
            }
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Typed entity IDs
// ---------------------------------------------------------------------------

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub SimUuid);

        impl $name {
            pub fn new(rng: &mut GameRng) -> Self {
                Self(SimUuid::new_v4(rng))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

entity_id!(/// A recruited shinobi.
UnitId);
entity_id!(/// A trainee waiting in the recruitment pipeline.
TraineeId);
entity_id!(/// A claimable task in the shared pool.
TaskId);
entity_id!(/// A village units can affiliate with.
VillageId);
entity_id!(/// A village-scoped mission.
MissionId);

// ---------------------------------------------------------------------------
// Shared enums
// ---------------------------------------------------------------------------

/// Elemental nature of a shinobi, trainee, or village.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Nature {
    Fire,
    Wind,
    Lightning,
    Earth,
    Water,
}

impl Nature {
    pub const ALL: [Nature; 5] = [
        Nature::Fire,
        Nature::Wind,
        Nature::Lightning,
        Nature::Earth,
        Nature::Water,
    ];
}

/// A trainee's jutsu specialty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Jutsu {
    Ninjutsu,
    Genjutsu,
    Taijutsu,
}

impl Jutsu {
    pub const ALL: [Jutsu; 3] = [Jutsu::Ninjutsu, Jutsu::Genjutsu, Jutsu::Taijutsu];
}
