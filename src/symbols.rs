//! Tabla de símbolos.
//!
//! Un header declara dos espacios de nombres disjuntos: macros de
//! preprocesador (`#define`) y settings de CMake. Ambos se acumulan en
//! una misma [`SymbolTable`] compartida entre el header raíz y todos los
//! headers que este incluye.
//!
//! # Resolución
//! El valor de un define puede ser el nombre de otro define. El valor
//! resuelto se obtiene siguiendo esa cadena hasta llegar a un literal o a
//! un nombre desconocido. Como cada define guarda su propio valor ya
//! resuelto, la cadena casi siempre tiene un solo paso, pero un define
//! cuyo valor es su propio nombre puede formar un ciclo; por eso se
//! lleva registro de los nombres visitados.

use std::{
    collections::HashMap,
    fmt::{self, Display},
};

use thiserror::Error;

use crate::{
    error::Findings,
    lex::SettingKind,
    source::{Located, Location},
};

/// Errores y advertencias de la tabla de símbolos.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SymbolError {
    /// Dos definiciones del mismo nombre con valores distintos.
    #[error("Conflicting {what} `{name}` (`{first}` at {previous} and `{second}`)")]
    Conflict {
        what: &'static str,
        name: String,
        first: String,
        second: String,
        previous: Location,
    },

    /// Dos definiciones idénticas del mismo nombre.
    #[error("Multiple {what} `{name}` with the same value `{value}`, first at {previous}")]
    Redefinition {
        what: &'static str,
        name: String,
        value: String,
        previous: Location,
    },

    /// La resolución de un valor volvió a un nombre ya visitado.
    #[error("Circular definition of `{name}`: {chain}")]
    Circular { name: String, chain: String },

    /// Un `#if` hace referencia a un nombre nunca definido.
    #[error("`#if {0}` refers to an undefined name")]
    Undefined(String),
}

/// Valor de un define o setting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    /// La mayoría de valores en headers de tarjetas son enteros.
    Int(i64),

    /// Cualquier otro texto, incluyendo nombres de otros defines.
    Text(String),
}

impl Value {
    /// Interpreta un texto como entero si es posible.
    pub fn parse(text: &str) -> Value {
        match parse_int(text) {
            Some(integer) => Value::Int(integer),
            None => Value::Text(text.to_owned()),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(integer) => Some(*integer),
            Value::Text(_) => None,
        }
    }

    /// Veracidad en el sentido de `#if`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Int(integer) => *integer != 0,
            Value::Text(text) => !text.is_empty(),
        }
    }
}

impl Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(integer) => write!(fmt, "{}", integer),
            Value::Text(text) => fmt.write_str(text),
        }
    }
}

/// Muestra un valor opcional en mensajes de error.
pub fn describe(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => String::from("<no value>"),
    }
}

/// Un `#define`.
#[derive(Clone, Debug)]
pub struct Define {
    name: String,
    value: Option<Value>,
    resolved: Option<Value>,
    location: Location,
}

impl Define {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Valor tal como aparece en el header.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Valor luego de seguir cadenas de defines.
    pub fn resolved(&self) -> Option<&Value> {
        self.resolved.as_ref()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Indica si el define fue insertado por el validador y no declarado.
    pub fn is_synthetic(&self) -> bool {
        self.location.line_number().is_none()
    }
}

/// Un setting de CMake.
#[derive(Clone, Debug)]
pub struct Binding {
    name: String,
    value: Value,
    location: Location,
}

impl Binding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

/// Entidades con nombre.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for Define {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Binding {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Mapa por nombre que preserva el orden de declaración.
pub struct Table<T> {
    entries: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T: Named> Table<T> {
    pub fn get(&self, name: &str) -> Option<&T> {
        self.index.get(name).map(|&index| &self.entries[index])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserta una entidad nueva. Retorna la anterior si el nombre ya existía.
    fn insert(&mut self, entry: T) -> Option<&T> {
        if let Some(&index) = self.index.get(entry.name()) {
            return Some(&self.entries[index]);
        }

        self.index.insert(entry.name().to_owned(), self.entries.len());
        self.entries.push(entry);

        None
    }
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Table {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

/// Defines y settings de CMake de un header y sus inclusiones.
#[derive(Default)]
pub struct SymbolTable {
    defines: Table<Define>,
    sets: Table<Binding>,
    defaults: Table<Binding>,
}

impl SymbolTable {
    /// Busca un define.
    pub fn lookup(&self, name: &str) -> Option<&Define> {
        self.defines.get(name)
    }

    /// Todos los defines en orden de declaración.
    pub fn defines(&self) -> &Table<Define> {
        &self.defines
    }

    /// Busca un setting de CMake del tipo indicado.
    pub fn setting(&self, kind: SettingKind, name: &str) -> Option<&Binding> {
        self.settings(kind).get(name)
    }

    pub fn settings(&self, kind: SettingKind) -> &Table<Binding> {
        match kind {
            SettingKind::Set => &self.sets,
            SettingKind::Default => &self.defaults,
        }
    }

    /// Cantidad de defines que efectivamente aparecen en algún header.
    pub fn declared_count(&self) -> usize {
        self.defines
            .iter()
            .filter(|define| !define.is_synthetic())
            .count()
    }

    /// Registra un `#define`.
    ///
    /// Una segunda definición del mismo nombre nunca reemplaza a la
    /// primera: si el valor difiere es un error, si es idéntico es solo
    /// una advertencia.
    pub fn define(
        &mut self,
        name: &str,
        raw: Option<&str>,
        location: Location,
        findings: &mut Findings,
    ) {
        let value = raw.map(Value::parse);
        let resolved = match &value {
            None => None,
            Some(value) => match self.resolve(value) {
                Ok(resolved) => resolved,
                Err(chain) => {
                    let error = SymbolError::Circular {
                        name: name.to_owned(),
                        chain: chain.join(" -> "),
                    };

                    findings.error(Located::at(error, location.clone()));
                    None
                }
            },
        };

        let define = Define {
            name: name.to_owned(),
            value,
            resolved,
            location,
        };

        let (location, value) = (define.location.clone(), define.value.clone());
        if let Some(previous) = self.defines.insert(define) {
            report_duplicate(
                "definitions for",
                name,
                previous.value(),
                value.as_ref(),
                previous.location(),
                location,
                findings,
            );
        }
    }

    /// Inserta un define que no proviene de ningún header.
    pub fn define_synthetic(&mut self, name: &str, value: Value, location: Location) {
        self.defines.insert(Define {
            name: name.to_owned(),
            value: Some(value.clone()),
            resolved: Some(value),
            location,
        });
    }

    /// Registra un setting de CMake.
    pub fn bind(
        &mut self,
        kind: SettingKind,
        name: &str,
        raw: &str,
        location: Location,
        findings: &mut Findings,
    ) {
        let value = Value::parse(raw);
        let binding = Binding {
            name: name.to_owned(),
            value: value.clone(),
            location: location.clone(),
        };

        let table = match kind {
            SettingKind::Set => &mut self.sets,
            SettingKind::Default => &mut self.defaults,
        };

        if let Some(previous) = table.insert(binding) {
            let what = match kind {
                SettingKind::Set => "values for pico_board_cmake_set",
                SettingKind::Default => "values for pico_board_cmake_set_default",
            };

            report_duplicate(
                what,
                name,
                Some(previous.value()),
                Some(&value),
                previous.location(),
                location,
                findings,
            );
        }
    }

    /// Sigue una cadena de defines a partir de un valor.
    ///
    /// Retorna la cadena de nombres visitados si se encuentra un ciclo.
    pub fn resolve(&self, value: &Value) -> Result<Option<Value>, Vec<String>> {
        let mut resolved = Some(value.clone());
        let mut chain: Vec<String> = Vec::new();

        while let Some(Value::Text(name)) = &resolved {
            let define = match self.defines.get(name) {
                Some(define) => define,
                None => break,
            };

            let looped = chain.contains(name);
            chain.push(name.clone());
            if looped {
                return Err(chain);
            }

            resolved = define.resolved.clone();
        }

        Ok(resolved)
    }
}

fn report_duplicate(
    what: &'static str,
    name: &str,
    first: Option<&Value>,
    second: Option<&Value>,
    previous: &Location,
    location: Location,
    findings: &mut Findings,
) {
    if first != second {
        let error = SymbolError::Conflict {
            what,
            name: name.to_owned(),
            first: describe(first),
            second: describe(second),
            previous: previous.clone(),
        };

        findings.error(Located::at(error, location));
    } else {
        let warning = SymbolError::Redefinition {
            what,
            name: name.to_owned(),
            value: describe(first),
            previous: previous.clone(),
        };

        findings.warn(Located::at(warning, location));
    }
}

/// Interpreta un literal entero con prefijos `0x`, `0o` y `0b`.
///
/// Los decimales con ceros a la izquierda son ambiguos en C (octal) y
/// por tanto no se consideran enteros.
pub fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let (radix, digits) = match digits.get(..2) {
        Some("0x") | Some("0X") => (16, &digits[2..]),
        Some("0o") | Some("0O") => (8, &digits[2..]),
        Some("0b") | Some("0B") => (2, &digits[2..]),
        _ => (10, digits),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }

    if radix == 10 && digits.starts_with('0') && digits.chars().any(|c| c != '0') {
        return None;
    }

    let magnitude = i64::from_str_radix(digits, radix).ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::LocatedError, source::Source};
    use std::{path::Path, rc::Rc};

    fn source() -> Rc<Source> {
        Rc::new(Source::new(Path::new("boards/test.h"), ""))
    }

    #[test]
    fn integer_literals() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int(" 0x1F "), Some(31));
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("0o17"), Some(15));
        assert_eq!(parse_int("-3"), Some(-3));
        assert_eq!(parse_int("0"), Some(0));
        assert_eq!(parse_int("000"), Some(0));
        assert_eq!(parse_int("010"), None);
        assert_eq!(parse_int("(16 * 1024 * 1024)"), None);
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int("+-1"), None);
    }

    #[test]
    fn resolves_through_aliases() {
        let source = source();
        let mut findings = Findings::new();
        let mut table = SymbolTable::default();

        table.define("LED", Some("25"), Location::line(&source, 1), &mut findings);
        table.define("ALIAS", Some("LED"), Location::line(&source, 2), &mut findings);
        table.define("PICO_DEFAULT_LED_PIN", Some("ALIAS"), Location::line(&source, 3), &mut findings);
        table.define("EMPTY", None, Location::line(&source, 4), &mut findings);
        table.define("TO_EMPTY", Some("EMPTY"), Location::line(&source, 5), &mut findings);
        table.define("UNKNOWN", Some("NOWHERE"), Location::line(&source, 6), &mut findings);

        let pin = table.lookup("PICO_DEFAULT_LED_PIN").unwrap();
        assert_eq!(pin.resolved(), Some(&Value::Int(25)));
        assert_eq!(pin.value(), Some(&Value::Text("ALIAS".into())));
        assert_eq!(table.lookup("TO_EMPTY").unwrap().resolved(), None);
        assert_eq!(
            table.lookup("UNKNOWN").unwrap().resolved(),
            Some(&Value::Text("NOWHERE".into()))
        );

        // Resolver dos veces produce lo mismo
        let again = table.resolve(pin.value().unwrap()).unwrap();
        assert_eq!(again.as_ref(), pin.resolved());
        assert!(findings.errors.is_empty());
    }

    #[test]
    fn conflicts_and_duplicates() {
        let source = source();
        let mut findings = Findings::new();
        let mut table = SymbolTable::default();

        table.define("PICO_FLASH_SIZE_BYTES", Some("2097152"), Location::line(&source, 1), &mut findings);
        table.define("PICO_FLASH_SIZE_BYTES", Some("2097152"), Location::line(&source, 2), &mut findings);
        assert!(findings.errors.is_empty());
        assert_eq!(findings.warnings.len(), 1);

        table.define("PICO_FLASH_SIZE_BYTES", Some("4194304"), Location::line(&source, 3), &mut findings);
        assert_eq!(findings.errors.len(), 1);

        let error = findings.errors.iter().next().unwrap();
        let message = error.source().to_string();
        assert!(message.contains("boards/test.h:1"), "{}", message);
        assert_eq!(error.location().line_number(), Some(3));
        assert_eq!(
            table.lookup("PICO_FLASH_SIZE_BYTES").unwrap().value(),
            Some(&Value::Int(2097152))
        );
    }

    #[test]
    fn binding_conflicts() {
        let source = source();
        let mut findings = Findings::new();
        let mut table = SymbolTable::default();

        table.bind(SettingKind::Set, "PICO_PLATFORM", "rp2040", Location::line(&source, 1), &mut findings);
        table.bind(SettingKind::Default, "PICO_PLATFORM", "rp2350", Location::line(&source, 2), &mut findings);
        assert!(findings.errors.is_empty());

        table.bind(SettingKind::Set, "PICO_PLATFORM", "rp2350", Location::line(&source, 3), &mut findings);
        assert_eq!(findings.errors.len(), 1);
        assert_eq!(
            table.setting(SettingKind::Set, "PICO_PLATFORM").unwrap().value(),
            &Value::Text("rp2040".into())
        );
    }

    #[test]
    fn circular_definitions_are_reported() {
        let source = source();
        let mut findings = Findings::new();
        let mut table = SymbolTable::default();

        // `B` termina resolviendo a su propio nombre
        table.define("A", Some("B"), Location::line(&source, 1), &mut findings);
        table.define("B", Some("A"), Location::line(&source, 2), &mut findings);
        table.define("C", Some("B"), Location::line(&source, 3), &mut findings);

        assert_eq!(findings.errors.len(), 1);
        assert_eq!(table.lookup("C").unwrap().resolved(), None);
        assert!(findings
            .errors
            .iter()
            .next()
            .unwrap()
            .source()
            .to_string()
            .contains("Circular definition of `C`"));
    }

    #[test]
    fn synthetic_defines_are_not_counted() {
        let source = source();
        let mut table = SymbolTable::default();
        table.define_synthetic("PICO_RP2350", Value::Int(1), Location::file(&source));

        assert_eq!(table.declared_count(), 0);
        assert_eq!(table.defines().len(), 1);
        assert!(table.lookup("PICO_RP2350").unwrap().is_synthetic());
    }
}
