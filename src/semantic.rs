use thiserror::Error;

use std::{
    collections::{HashMap, HashSet},
    error::Error,
};

use tracing::debug;

use crate::{
    chip::{Chip, Family},
    error::{Failure, Findings},
    lex::SettingKind,
    parse::{Board, FPGA_HEADER, PLACEHOLDER_HEADER},
    schema::Schema,
    source::{Located, Location},
    symbols::{describe, Define, SymbolTable, Value},
    CheckFlags, Options,
};

const PLATFORM: &str = "PICO_PLATFORM";

const FLASH_SIZE: &str = "PICO_FLASH_SIZE_BYTES";

const A2_SUPPORTED: &str = "PICO_RP2350_A2_SUPPORTED";

const DEFAULT_PREFIX: &str = "PICO_DEFAULT_";

const PIN_SUFFIX: &str = "_PIN";

/// Interfaz que no se describe en los esquemas.
const SCHEMALESS_INTERFACE: &str = "WS2812";

/// Un header de la plataforma host no requiere detección de tarjeta.
const NO_DETECTION: &str = "NONE";

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SemanticError {
    #[error("Missing a `pico_board_cmake_set(PICO_PLATFORM, ...)`")]
    MissingPlatform,

    #[error("Unknown PICO_PLATFORM `{0}`, expected `rp2040` or `rp2350`")]
    UnknownPlatform(String),

    /// Advertencia.
    #[error("`PICO_RP2350B` is deprecated, use `#define PICO_RP2350A 0` instead")]
    DeprecatedVariant,

    #[error("Missing a `pico_board_cmake_set_default({0}, ...)`")]
    MissingDefault(&'static str),

    #[error("Missing a `#define {0}`")]
    MissingDefine(&'static str),

    #[error("Has `pico_board_cmake_set_default({0}, ...)` but is missing a matching `#define`")]
    DefaultWithoutDefine(&'static str),

    #[error("Has `#define {0}` but is missing a matching `pico_board_cmake_set_default`")]
    DefineWithoutDefault(&'static str),

    #[error("Mismatched `pico_board_cmake_set_default` and `#define` values for `{name}` (`{setting}` and `{define}`)")]
    SettingMismatch {
        name: &'static str,
        setting: Value,
        define: String,
    },

    #[error("Chip {chip} requires `#define PICO_RP2350_A2_SUPPORTED 1`, found `{value}`")]
    A2Unsupported { chip: Chip, value: String },

    #[error("Header is for {chip} and so shouldn't have settings for {other} (`{name}`)")]
    ForeignChip {
        chip: Chip,
        other: Family,
        name: String,
    },

    #[error("`{0}` is set to an undefined value")]
    UndefinedPin(String),

    #[error("`{name}` resolves to a non-integer value `{value}`")]
    NonIntegerPin { name: String, value: String },

    #[error("Pin {pin} for `{name}` isn't a valid pin-number on {chip}")]
    InvalidPin { name: String, pin: i64, chip: Chip },

    /// Advertencia.
    #[error("Both `{first}` and `{second}` claim to be pin {pin}")]
    SharedPin {
        first: String,
        second: String,
        pin: i64,
    },

    #[error("`{name}` is defined but {interface} isn't in the {chip} interface schema")]
    UnknownInterface {
        name: String,
        interface: String,
        chip: Chip,
    },

    #[error("`{name}` is defined but `{instance}` isn't defined")]
    MissingInstance { name: String, instance: String },

    #[error("`{instance}` is set to an invalid instance {value}")]
    InvalidInstance { instance: String, value: String },

    #[error("`{name}` is defined but {function} isn't a valid function for `{instance}`")]
    InvalidFunction {
        name: String,
        function: String,
        instance: String,
    },

    #[error("`{name}` is set to {pin} which isn't a valid pin for {function} on {interface} {instance}")]
    InvalidFunctionPin {
        name: String,
        pin: i64,
        function: String,
        interface: String,
        instance: i64,
    },

    #[error("`{name}` is defined but `{pin}` isn't defined")]
    MissingFunctionPin { name: String, pin: String },

    #[error("`{name}` is defined but none of {candidates} are defined")]
    NoFunctionPin { name: String, candidates: String },

    #[error("No include-guard (expected `{0}`)")]
    MissingGuard(String),

    #[error("No board-detection `#define` (expected `{0}`)")]
    MissingDetection(String),

    #[error("No include-suggestion comment (expected \"{0}\")")]
    MissingSuggestion(String),
}

/// Valida un header ya recorrido.
///
/// Retorna el chip identificado junto con todo lo acumulado. Los errores
/// acumulados no se convierten aquí en [`Failure::Rejected`], salvo que
/// el chip no pueda determinarse.
pub fn validate(board: &Board, options: &Options, findings: Findings) -> Result<(Chip, Findings), Failure> {
    let mut validator = Validator {
        board,
        symbols: board.symbols(),
        findings,
        invalid_instances: HashSet::new(),
    };

    let chip = match validator.classify() {
        Some(chip) => chip,
        None => return Err(Failure::rejected(validator.findings)),
    };

    debug!(%chip, "chip classified");

    let path = chip.schema_path(&options.sdk);
    let schema = match Schema::load(&path) {
        Ok(schema) => schema,
        Err(error) => return Err(Failure::fatal(validator.findings, error)),
    };

    debug!(schema = %path.display(), "schema loaded");

    validator.defines(chip, &schema);
    validator.markers(options.flags);

    Ok((chip, validator.findings))
}

struct Validator<'a> {
    board: &'a Board,
    symbols: &'a SymbolTable,
    findings: Findings,
    /// Instancias inválidas ya reportadas.
    invalid_instances: HashSet<&'a str>,
}

impl<'a> Validator<'a> {
    fn error<E: Error + 'static>(&mut self, error: E, location: &Location) {
        self.findings.error(Located::at(error, location.clone()));
    }

    fn warn<E: Error + 'static>(&mut self, warning: E, location: &Location) {
        self.findings.warn(Located::at(warning, location.clone()));
    }

    fn classify(&mut self) -> Option<Chip> {
        let symbols = self.symbols;
        let board = self.board;
        let file_name = board.file_name();

        if file_name == PLACEHOLDER_HEADER {
            return Some(Chip::Rp2040);
        }

        let platform = match symbols.setting(SettingKind::Set, PLATFORM) {
            Some(platform) => platform,
            None => {
                self.error(SemanticError::MissingPlatform, &board.location());
                return None;
            }
        };

        let value = platform.value().to_string();
        let family = match value.parse::<Family>() {
            Ok(family) => family,
            Err(()) => {
                self.error(SemanticError::UnknownPlatform(value), platform.location());
                return None;
            }
        };

        let chip = match family {
            Family::Rp2040 => Chip::Rp2040,
            Family::Rp2350 => {
                let variant_a = symbols.lookup("PICO_RP2350A");
                if variant_a.is_none() {
                    if let Some(deprecated) = symbols.lookup("PICO_RP2350B") {
                        self.warn(SemanticError::DeprecatedVariant, deprecated.location());
                    }
                }

                match variant_a.and_then(Define::resolved) {
                    Some(Value::Int(1)) => Chip::Rp2350A,
                    _ => Chip::Rp2350B,
                }
            }
        };

        let needs_a2 = family == Family::Rp2350 && file_name != FPGA_HEADER;
        self.companion(FLASH_SIZE, true);
        self.companion(A2_SUPPORTED, needs_a2);

        if needs_a2 {
            if let Some(define) = symbols.lookup(A2_SUPPORTED) {
                if define.resolved() != Some(&Value::Int(1)) {
                    let error = SemanticError::A2Unsupported {
                        chip,
                        value: describe(define.resolved()),
                    };

                    self.error(error, define.location());
                }
            }
        }

        Some(chip)
    }

    /// Verifica que un setting por defecto y su `#define` coincidan.
    fn companion(&mut self, name: &'static str, required: bool) {
        let symbols = self.symbols;
        let location = self.board.location();

        let setting = symbols.setting(SettingKind::Default, name);
        match (setting, symbols.lookup(name)) {
            (None, None) if required => {
                self.error(SemanticError::MissingDefault(name), &location);
                self.error(SemanticError::MissingDefine(name), &location);
            }

            (None, None) => (),

            (Some(setting), None) => {
                self.error(SemanticError::DefaultWithoutDefine(name), setting.location());
            }

            (None, Some(define)) => {
                self.error(SemanticError::DefineWithoutDefault(name), define.location());
            }

            (Some(setting), Some(define)) => {
                if Some(setting.value()) != define.resolved() {
                    let error = SemanticError::SettingMismatch {
                        name,
                        setting: setting.value().clone(),
                        define: describe(define.resolved()),
                    };

                    self.error(error, define.location());
                }
            }
        }
    }

    fn defines(&mut self, chip: Chip, schema: &Schema) {
        let symbols = self.symbols;
        let other = chip.family().other();
        let mut claims = HashMap::new();

        for define in symbols.defines().iter() {
            let name = define.name();

            if name.contains(other.token()) {
                let error = SemanticError::ForeignChip {
                    chip,
                    other,
                    name: name.to_owned(),
                };

                self.error(error, define.location());
            }

            if name.ends_with(PIN_SUFFIX) {
                self.pin(define, chip, schema, &mut claims);
            }

            if let Some((interface, function)) = split_function_pin(name) {
                self.function_pin(define, interface, function, chip, schema);
            } else if let Some(interface) = split_instance(name) {
                self.instance(define, interface, chip, schema);
            }
        }
    }

    fn pin(&mut self, define: &'a Define, chip: Chip, schema: &Schema, claims: &mut HashMap<i64, &'a str>) {
        let name = define.name();

        let pin = match define.resolved() {
            Some(Value::Int(pin)) => *pin,
            Some(Value::Text(text)) => {
                let error = SemanticError::NonIntegerPin {
                    name: name.to_owned(),
                    value: text.clone(),
                };

                return self.error(error, define.location());
            }

            None => return self.error(SemanticError::UndefinedPin(name.to_owned()), define.location()),
        };

        // Solo un literal repetido cuenta como conflicto; un alias de otro
        // define que comparte pin es intencional
        let literal = define.value() == define.resolved();
        match claims.get(&pin) {
            Some(first) if literal => {
                let warning = SemanticError::SharedPin {
                    first: (*first).to_owned(),
                    second: name.to_owned(),
                    pin,
                };

                self.warn(warning, define.location());
            }

            Some(_) => (),
            None => {
                claims.insert(pin, name);
            }
        }

        if !schema.allows_pin(pin) {
            let error = SemanticError::InvalidPin {
                name: name.to_owned(),
                pin,
                chip,
            };

            self.error(error, define.location());
        }
    }

    /// `PICO_DEFAULT_<IFACE>_<FUNC>_PIN`
    fn function_pin(&mut self, define: &Define, interface: &str, function: &str, chip: Chip, schema: &Schema) {
        if interface == SCHEMALESS_INTERFACE {
            return;
        }

        let symbols = self.symbols;
        let name = define.name();
        let instance_name = format!("{}{}", DEFAULT_PREFIX, interface);

        let (interface_name, interface) = match schema.resolve_interface(interface) {
            Some(found) => found,
            None => {
                let error = SemanticError::UnknownInterface {
                    name: name.to_owned(),
                    interface: interface.to_owned(),
                    chip,
                };

                return self.error(error, define.location());
            }
        };

        let instance = match symbols.lookup(&instance_name) {
            Some(instance) => instance,
            None => {
                let error = SemanticError::MissingInstance {
                    name: name.to_owned(),
                    instance: instance_name,
                };

                return self.error(error, define.location());
            }
        };

        let number = instance.resolved().and_then(Value::as_int);
        let (number, functions) = match number.and_then(|number| Some((number, interface.instance(number)?))) {
            Some(found) => found,
            None => {
                if !self.invalid_instances.insert(instance.name()) {
                    return;
                }

                let error = SemanticError::InvalidInstance {
                    instance: instance_name,
                    value: describe(instance.resolved()),
                };

                return self.error(error, instance.location());
            }
        };

        let pins = match functions.get(function) {
            Some(pins) => pins,
            None => {
                let error = SemanticError::InvalidFunction {
                    name: name.to_owned(),
                    function: function.to_owned(),
                    instance: instance_name,
                };

                return self.error(error, define.location());
            }
        };

        // Un pin no entero ya se reportó como tal
        if let Some(pin) = define.resolved().and_then(Value::as_int) {
            let valid = u32::try_from(pin).map_or(false, |pin| pins.contains(&pin));
            if !valid {
                let error = SemanticError::InvalidFunctionPin {
                    name: name.to_owned(),
                    pin,
                    function: function.to_owned(),
                    interface: interface_name.to_owned(),
                    instance: number,
                };

                self.error(error, define.location());
            }
        }
    }

    /// `PICO_DEFAULT_<IFACE>`
    fn instance(&mut self, define: &Define, interface: &str, chip: Chip, schema: &Schema) {
        let symbols = self.symbols;
        let name = define.name();

        let interface = match schema.resolve_interface(interface) {
            Some((_, interface)) => interface,
            None => {
                let error = SemanticError::UnknownInterface {
                    name: name.to_owned(),
                    interface: interface.to_owned(),
                    chip,
                };

                return self.error(error, define.location());
            }
        };

        let expected = match interface.expected_functions() {
            Some(expected) => expected,
            None => return,
        };

        let pin_name = |function: &String| format!("{}_{}{}", name, function, PIN_SUFFIX);

        for function in &expected.required {
            let pin = pin_name(function);
            if !symbols.defines().contains(&pin) {
                let error = SemanticError::MissingFunctionPin {
                    name: name.to_owned(),
                    pin,
                };

                self.error(error, define.location());
            }
        }

        if !expected.one_of.is_empty() {
            let pins: Vec<String> = expected.one_of.iter().map(pin_name).collect();
            if !pins.iter().any(|pin| symbols.defines().contains(pin)) {
                let error = SemanticError::NoFunctionPin {
                    name: name.to_owned(),
                    candidates: join_with(&pins, "or"),
                };

                self.error(error, define.location());
            }
        }
    }

    fn markers(&mut self, flags: CheckFlags) {
        let board = self.board;
        let markers = board.markers();
        let expected = board.expected();
        let location = board.location();

        if !markers.guard {
            self.error(SemanticError::MissingGuard(expected.guard.clone()), &location);
        }

        if !markers.detection && expected.detection != NO_DETECTION {
            let error = SemanticError::MissingDetection(expected.detection.clone());
            self.error(error, &location);
        }

        if flags.contains(CheckFlags::REQUIRE_INCLUDE_SUGGESTION) && !markers.suggestion {
            let error = SemanticError::MissingSuggestion(expected.include_path.clone());
            self.error(error, &location);
        }
    }
}

/// Separa `PICO_DEFAULT_<IFACE>_<FUNC>_PIN` en interfaz y función.
fn split_function_pin(name: &str) -> Option<(&str, &str)> {
    let body = name.strip_prefix(DEFAULT_PREFIX)?.strip_suffix(PIN_SUFFIX)?;
    let (interface, function) = body.split_once('_')?;

    (is_token(interface) && is_token(function)).then(|| (interface, function))
}

/// Extrae la interfaz de `PICO_DEFAULT_<IFACE>`.
fn split_instance(name: &str) -> Option<&str> {
    let interface = name.strip_prefix(DEFAULT_PREFIX)?;
    is_token(interface).then(|| interface)
}

fn is_token(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// `A, B or C`
fn join_with(items: &[String], joiner: &str) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} {} {}", init.join(", "), joiner, last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pin_names() {
        assert_eq!(
            split_function_pin("PICO_DEFAULT_UART_TX_PIN"),
            Some(("UART", "TX"))
        );
        assert_eq!(
            split_function_pin("PICO_DEFAULT_I2C0_SDA_PIN"),
            Some(("I2C0", "SDA"))
        );
        assert_eq!(split_function_pin("PICO_DEFAULT_LED_PIN"), None);
        assert_eq!(split_function_pin("PICO_DEFAULT_SPI_RX_EXTRA_PIN"), None);
        assert_eq!(split_function_pin("PICO_DEFAULT_PIN"), None);

        assert_eq!(split_instance("PICO_DEFAULT_UART"), Some("UART"));
        assert_eq!(split_instance("PICO_DEFAULT_LED_PIN"), None);
        assert_eq!(split_instance("PICO_DEFAULT_"), None);
    }

    #[test]
    fn joined_lists() {
        let items = |names: &[&str]| names.iter().map(|name| name.to_string()).collect::<Vec<_>>();

        assert_eq!(join_with(&items(&[]), "or"), "");
        assert_eq!(join_with(&items(&["A"]), "or"), "A");
        assert_eq!(join_with(&items(&["A", "B"]), "or"), "A or B");
        assert_eq!(join_with(&items(&["A", "B", "C"]), "or"), "A, B or C");
    }
}
