//! Esquemas de capacidades de hardware.
//!
//! Cada variante de chip tiene un documento JSON externo que describe
//! cuáles pines existen y qué funciones puede cumplir cada pin para cada
//! instancia de cada interfaz periférica:
//!
//! ```json
//! {
//!     "pins": [0, 1, 2],
//!     "interfaces": {
//!         "UART": {
//!             "instances": { "0": { "TX": [0], "RX": [1] } },
//!             "expected_functions": { "required": ["TX", "RX"] }
//!         }
//!     }
//! }
//! ```
//!
//! JSON no permite llaves enteras, por lo que los números de instancia
//! se leen como texto y se convierten aquí.

use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::Path,
    rc::Rc,
};

use serde::Deserialize;
use thiserror::Error;

use crate::source::{Located, Location, Source};

/// Error al cargar un esquema.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Failed to read capability schema: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed capability schema: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Instance `{key}` of interface `{interface}` is not an integer")]
    InstanceKey { interface: String, key: String },
}

/// Pines aceptables por función, para una instancia de una interfaz.
pub type Functions = BTreeMap<String, BTreeSet<u32>>;

/// Funciones que toda instancia por defecto de una interfaz debe asignar.
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpectedFunctions {
    /// Todas estas funciones deben tener pin.
    #[serde(default)]
    pub required: Vec<String>,

    /// Al menos una de estas funciones debe tener pin.
    #[serde(default)]
    pub one_of: Vec<String>,
}

/// Una interfaz periférica, como `UART` o `I2C`.
#[derive(Clone, Debug)]
pub struct Interface {
    instances: BTreeMap<u32, Functions>,
    expected: Option<ExpectedFunctions>,
}

impl Interface {
    /// Funciones de una instancia, si el número es válido.
    pub fn instance(&self, number: i64) -> Option<&Functions> {
        u32::try_from(number)
            .ok()
            .and_then(|number| self.instances.get(&number))
    }

    pub fn expected_functions(&self) -> Option<&ExpectedFunctions> {
        self.expected.as_ref()
    }
}

/// Esquema de capacidades de una variante de chip.
#[derive(Clone, Debug)]
pub struct Schema {
    pins: BTreeSet<u32>,
    interfaces: BTreeMap<String, Interface>,
}

#[derive(Deserialize)]
struct RawSchema {
    pins: Vec<u32>,
    interfaces: BTreeMap<String, RawInterface>,
}

#[derive(Deserialize)]
struct RawInterface {
    instances: BTreeMap<String, Functions>,
    #[serde(default)]
    expected_functions: Option<ExpectedFunctions>,
}

impl Schema {
    /// Carga un esquema desde un archivo JSON.
    pub fn load(path: &Path) -> Result<Schema, Located<SchemaError>> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) => {
                let source = Rc::new(Source::new(path, ""));
                return Err(Located::at(error.into(), Location::file(&source)));
            }
        };

        let source = Rc::new(Source::new(path, &text));
        Schema::parse(&text, &source)
    }

    /// Interpreta el texto de un esquema.
    pub fn parse(text: &str, source: &Rc<Source>) -> Result<Schema, Located<SchemaError>> {
        let raw: RawSchema = serde_json::from_str(text).map_err(|error| {
            let location = match error.line() {
                0 => Location::file(source),
                line => Location::line(source, line as u32),
            };

            Located::at(SchemaError::from(error), location)
        })?;

        let mut interfaces = BTreeMap::new();
        for (name, raw_interface) in raw.interfaces {
            let mut instances = BTreeMap::new();
            for (key, functions) in raw_interface.instances {
                let number = match key.trim().parse::<u32>() {
                    Ok(number) => number,
                    Err(_) => {
                        let error = SchemaError::InstanceKey {
                            interface: name,
                            key,
                        };

                        return Err(Located::at(error, Location::file(source)));
                    }
                };

                instances.insert(number, functions);
            }

            let interface = Interface {
                instances,
                expected: raw_interface.expected_functions,
            };

            interfaces.insert(name, interface);
        }

        Ok(Schema {
            pins: raw.pins.into_iter().collect(),
            interfaces,
        })
    }

    /// Determina si un pin existe en este chip.
    pub fn allows_pin(&self, pin: i64) -> bool {
        u32::try_from(pin)
            .map(|pin| self.pins.contains(&pin))
            .unwrap_or(false)
    }

    /// Busca una interfaz por nombre.
    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.get(name)
    }

    /// Busca la interfaz a la que se refiere un nombre de macro.
    ///
    /// Algunos headers numeran la interfaz en el nombre (`I2C0`) aunque
    /// el esquema solo conozca `I2C`.
    pub fn resolve_interface<'n>(&self, name: &'n str) -> Option<(&'n str, &Interface)> {
        if let Some(interface) = self.interface(name) {
            return Some((name, interface));
        }

        let trimmed = name.trim_end_matches(|c: char| c.is_ascii_digit());
        if trimmed.is_empty() || trimmed.len() == name.len() {
            return None;
        }

        self.interface(trimmed).map(|interface| (trimmed, interface))
    }
}
