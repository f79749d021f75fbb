//! Chips objetivo.
//!
//! Existen dos familias físicas de chip. La familia RP2350 se divide a
//! su vez en dos variantes compatibles en pines (A y B), las cuales se
//! diferencian únicamente en la cantidad de pines disponibles y por
//! tanto tienen esquemas de capacidades distintos.

use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    str::FromStr,
};

/// Familia de chip.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Family {
    Rp2040,
    Rp2350,
}

impl Family {
    /// Token que identifica a la familia dentro de nombres de macros.
    pub fn token(self) -> &'static str {
        match self {
            Family::Rp2040 => "RP2040",
            Family::Rp2350 => "RP2350",
        }
    }

    /// La otra familia.
    pub fn other(self) -> Family {
        match self {
            Family::Rp2040 => Family::Rp2350,
            Family::Rp2350 => Family::Rp2040,
        }
    }
}

impl Display for Family {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.write_str(self.token())
    }
}

/// Valor de `PICO_PLATFORM`.
///
/// Las plataformas se traducen a familias; la variante exacta dentro de
/// la familia se decide a partir de defines del header.
impl FromStr for Family {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        match string {
            "rp2040" => Ok(Family::Rp2040),
            "rp2350" => Ok(Family::Rp2350),
            _ => Err(()),
        }
    }
}

/// Variante concreta de chip.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Chip {
    Rp2040,
    Rp2350A,
    Rp2350B,
}

impl Chip {
    pub fn family(self) -> Family {
        match self {
            Chip::Rp2040 => Family::Rp2040,
            Chip::Rp2350A | Chip::Rp2350B => Family::Rp2350,
        }
    }

    /// Ruta del esquema de capacidades, relativa a la raíz del SDK.
    pub fn schema_path(self, sdk: &Path) -> PathBuf {
        let relative = match self {
            Chip::Rp2040 => "src/rp2040/rp2040_interface_pins.json",
            Chip::Rp2350A => "src/rp2350/rp2350a_interface_pins.json",
            Chip::Rp2350B => "src/rp2350/rp2350b_interface_pins.json",
        };

        sdk.join(relative)
    }
}

impl Display for Chip {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chip::Rp2040 => "RP2040",
            Chip::Rp2350A => "RP2350A",
            Chip::Rp2350B => "RP2350B",
        };

        fmt.write_str(name)
    }
}
