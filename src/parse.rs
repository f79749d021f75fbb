//! Recorrido de headers.
//!
//! Aquí se combinan las fases anteriores: cada línea se clasifica con
//! [`Directive::classify`], el [`ValidityStack`] decide si la directiva
//! aplica y, de ser así, se registra en la [`SymbolTable`]. Un
//! `#include` local provoca un descenso recursivo inmediato sobre el
//! archivo incluido, compartiendo el mismo [`ScanContext`] y por tanto
//! la misma tabla de símbolos.
//!
//! Las verificaciones que dependen de la posición de una directiva
//! dentro del header raíz (include guard, macro de detección de tarjeta,
//! sugerencia de include) también ocurren aquí, ya que después de este
//! recorrido esa información deja de existir.

use std::{
    ffi::OsStr,
    io,
    path::{Path, PathBuf},
    rc::Rc,
};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    cond::{NestingError, ValidityStack},
    error::Findings,
    lex::{self, DeclForm, Directive, DirectiveError},
    source::{Located, Location, Source},
    symbols::{self, SymbolError, SymbolTable, Value},
};

/// Nombre del header que representa a la plataforma host.
pub const PLACEHOLDER_HEADER: &str = "none.h";

/// Nombre del header de la FPGA de desarrollo de RP2350.
pub const FPGA_HEADER: &str = "amethyst_fpga.h";

const GUARD_PREFIX: &str = "_BOARDS_";

const GUARD_SUFFIX: &str = "_H";

/// Errores de recorrido.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParseError {
    /// Condicionales desbalanceados. Fatal.
    #[error(transparent)]
    Nesting(#[from] NestingError),

    /// Un header se incluye a sí mismo, directa o indirectamente. Fatal.
    #[error("Include cycle: {0}")]
    IncludeCycle(String),

    #[error("Failed to read `{path}`: {error}")]
    Io { path: String, error: io::Error },

    #[error("Include of \"{0}\" must name a `.h` header in the boards directory")]
    BadInclude(String),

    #[error("`#ifndef {ifndef}` / `#define {define}` mismatch")]
    IfndefMismatch { ifndef: String, define: String },

    #[error("Include-guard `#define {0}` is missing an `#ifndef`")]
    GuardWithoutIfndef(String),

    #[error("Include-guard `#define {0}` shouldn't have a value")]
    GuardValue(String),

    #[error("Include-guard `#define {0}` should be the first define")]
    GuardNotFirst(String),

    #[error("Found include-guard `#define {found}` but expected `{expected}`")]
    GuardName { found: String, expected: String },

    #[error("Board-detection `#define {0}` shouldn't have a value")]
    DetectionValue(String),

    #[error("Board-detection `#define {found}` should end with `{expected}`")]
    DetectionName { found: String, expected: String },

    #[error("Suggests including \"{found}\" but file is named \"{expected}\"")]
    SuggestionMismatch { found: String, expected: String },
}

/// Nombres que se derivan mecánicamente de la ruta del header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpectedNames {
    /// Ruta con la cual otros headers deberían incluir a este.
    pub include_path: String,

    /// Nombre exacto del include guard.
    pub guard: String,

    /// Nombre (o sufijo) de la macro de detección de tarjeta.
    pub detection: String,
}

impl ExpectedNames {
    pub fn for_path(path: &Path) -> Self {
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let include_path = match path.parent().and_then(Path::file_name) {
            Some(directory) => format!("{}/{}", directory.to_string_lossy(), file),
            None => file.clone(),
        };

        let guard = format!("_{}", to_macro_name(&include_path));

        let upper = file.to_uppercase();
        let stem = upper.strip_suffix(".H").unwrap_or(&upper);
        let detection = to_macro_name(stem);

        ExpectedNames {
            include_path,
            guard,
            detection,
        }
    }
}

/// Marcas encontradas en el header raíz.
#[derive(Copy, Clone, Debug, Default)]
pub struct Markers {
    pub guard: bool,
    pub detection: bool,
    pub suggestion: bool,
}

/// Resultado de recorrer un header y todas sus inclusiones.
pub struct Board {
    source: Rc<Source>,
    symbols: SymbolTable,
    expected: ExpectedNames,
    markers: Markers,
}

impl Board {
    /// Header raíz.
    pub fn source(&self) -> &Rc<Source> {
        &self.source
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn expected(&self) -> &ExpectedNames {
        &self.expected
    }

    pub fn markers(&self) -> Markers {
        self.markers
    }

    /// Nombre de archivo del header raíz.
    pub fn file_name(&self) -> String {
        self.source
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Ubicación que abarca todo el header raíz.
    pub fn location(&self) -> Location {
        Location::file(&self.source)
    }
}

/// Recorre un header y sus inclusiones locales.
///
/// Los problemas no fatales se agregan a `findings`. Un error retornado
/// es siempre fatal: el recorrido se abandona en ese punto.
pub fn scan(path: &Path, findings: &mut Findings) -> Result<Board, Located<ParseError>> {
    let source = match Source::load(path) {
        Ok(source) => source,
        Err(error) => {
            let source = Rc::new(Source::new(path, ""));
            let error = ParseError::Io {
                path: path.display().to_string(),
                error,
            };

            return Err(Located::at(error, Location::file(&source)));
        }
    };

    let mut context = ScanContext {
        symbols: SymbolTable::default(),
        findings,
        root_dir: path.parent().unwrap_or_else(|| Path::new("")).to_path_buf(),
        chain: vec![path.to_path_buf()],
        expected: ExpectedNames::for_path(path),
        markers: Markers::default(),
    };

    if source.path().file_name() == Some(OsStr::new(FPGA_HEADER)) {
        let location = Location::file(&source);
        context
            .symbols
            .define_synthetic("PICO_RP2350", Value::Int(1), location);
    }

    context.scan_file(Rc::clone(&source), true)?;

    let ScanContext {
        symbols,
        expected,
        markers,
        ..
    } = context;

    Ok(Board {
        source,
        symbols,
        expected,
        markers,
    })
}

/// Estado compartido por todos los niveles de inclusión.
struct ScanContext<'f> {
    symbols: SymbolTable,
    findings: &'f mut Findings,
    root_dir: PathBuf,
    chain: Vec<PathBuf>,
    expected: ExpectedNames,
    markers: Markers,
}

/// Estado propio de cada archivo.
struct Frame {
    source: Rc<Source>,
    is_root: bool,
    validity: ValidityStack,
    last_ifndef: Option<(String, u32)>,
    detection_is_next: bool,
}

impl ScanContext<'_> {
    fn scan_file(&mut self, source: Rc<Source>, is_root: bool) -> Result<(), Located<ParseError>> {
        debug!(file = source.name(), is_root, "scanning header");

        let mut frame = Frame {
            source: Rc::clone(&source),
            is_root,
            validity: ValidityStack::new(),
            last_ifndef: None,
            detection_is_next: false,
        };

        for (number, line) in source.numbered_lines() {
            let directive = Directive::classify(line);
            let location = Location::line(&source, number);

            let name = directive.name().filter(|_| frame.validity.is_active());
            if let Some(name) = name {
                if !lex::is_uppercase_name(name) {
                    let error = DirectiveError::Lowercase(name.to_owned());
                    self.findings.error(Located::at(error, location.clone()));
                }
            }

            self.directive(&mut frame, directive, number, location)?;
        }

        frame
            .validity
            .finish()
            .map_err(|error| Located::at(ParseError::from(error), Location::file(&source)))
    }

    fn directive(
        &mut self,
        frame: &mut Frame,
        directive: Directive,
        number: u32,
        location: Location,
    ) -> Result<(), Located<ParseError>> {
        if directive.is_control_flow() {
            return self.control_flow(frame, directive, number, location);
        }

        match directive {
            Directive::BoardDetection => {
                if frame.is_root {
                    frame.detection_is_next = true;
                }
            }

            Directive::IncludeSuggestion(path) => {
                if frame.is_root {
                    self.check_suggestion(path, location);
                }
            }

            _ if !frame.validity.is_active() => (),

            Directive::ConfigDecl {
                form,
                kind,
                name,
                value,
            } => {
                if form == DeclForm::Comment {
                    let error = DirectiveError::LegacyConfigDecl {
                        legacy: kind.legacy_name(),
                        call: kind.call_name(),
                        name: name.clone(),
                        value: value.clone(),
                    };

                    self.findings.error(Located::at(error, location.clone()));
                }

                self.symbols
                    .bind(kind, &name, &value, location, self.findings);
            }

            Directive::Define { name, value } => self.define(frame, name, value, number, location),
            Directive::Include(path) => self.include(&path, location)?,
            _ => (),
        }

        Ok(())
    }

    /// Condicionales; se procesan aunque la rama actual esté inactiva.
    fn control_flow(
        &mut self,
        frame: &mut Frame,
        directive: Directive,
        number: u32,
        location: Location,
    ) -> Result<(), Located<ParseError>> {
        match directive {
            Directive::Else => frame
                .validity
                .flip()
                .map_err(|error| Located::at(ParseError::from(error), location))?,

            Directive::EndIf => frame
                .validity
                .pop()
                .map_err(|error| Located::at(ParseError::from(error), location))?,

            Directive::If { negated, name } => {
                let condition = frame.validity.is_active() && self.truth(&name, &location) != negated;
                frame.validity.push(condition);
            }

            Directive::IfDef(name) => {
                let defined = self.symbols.lookup(&name).is_some();
                frame.validity.push(defined);
            }

            Directive::IfNDef(name) => {
                let defined = self.symbols.lookup(&name).is_some();
                if frame.validity.is_active() {
                    frame.last_ifndef = Some((name, number));
                }

                frame.validity.push(!defined);
            }

            Directive::UnsupportedConditional(text) => {
                if frame.validity.is_active() {
                    let error = DirectiveError::UnsupportedConditional(text);
                    self.findings.error(Located::at(error, location));
                }

                frame.validity.push(false);
            }

            _ => (),
        }

        Ok(())
    }

    /// Evalúa la condición de `#if NAME`.
    ///
    /// Un nombre no definido se reporta y se considera falso, como lo
    /// haría el preprocesador de C. Se aceptan también literales enteros.
    fn truth(&mut self, name: &str, location: &Location) -> bool {
        if let Some(literal) = symbols::parse_int(name) {
            return literal != 0;
        }

        match self.symbols.lookup(name) {
            Some(define) => define.resolved().map_or(false, Value::is_truthy),
            None => {
                let error = SymbolError::Undefined(name.to_owned());
                self.findings.error(Located::at(error, location.clone()));
                false
            }
        }
    }

    fn define(
        &mut self,
        frame: &mut Frame,
        name: String,
        value: Option<String>,
        number: u32,
        location: Location,
    ) {
        let after_ifndef = match &frame.last_ifndef {
            Some((ifndef, line)) if line + 1 == number => {
                if *ifndef != name {
                    let error = ParseError::IfndefMismatch {
                        ifndef: ifndef.clone(),
                        define: name.clone(),
                    };

                    self.findings.error(Located::at(error, location.clone()));
                }

                true
            }

            _ => false,
        };

        if frame.is_root {
            if is_guard_name(&name) {
                self.check_guard(&name, value.as_deref(), after_ifndef, &location);
            }

            if std::mem::take(&mut frame.detection_is_next) {
                self.check_detection(&name, value.as_deref(), &location);
            }
        }

        trace!(file = frame.source.name(), line = number, name = %name, "define");
        self.symbols
            .define(&name, value.as_deref(), location, self.findings);
    }

    fn check_guard(&mut self, name: &str, value: Option<&str>, after_ifndef: bool, location: &Location) {
        let mut errors = Vec::new();

        if !after_ifndef {
            errors.push(ParseError::GuardWithoutIfndef(name.to_owned()));
        }

        if value.is_some() {
            errors.push(ParseError::GuardValue(name.to_owned()));
        }

        if self.symbols.declared_count() > 0 {
            errors.push(ParseError::GuardNotFirst(name.to_owned()));
        }

        if name != self.expected.guard {
            errors.push(ParseError::GuardName {
                found: name.to_owned(),
                expected: self.expected.guard.clone(),
            });
        }

        self.markers.guard = true;
        for error in errors {
            self.findings.error(Located::at(error, location.clone()));
        }
    }

    fn check_detection(&mut self, name: &str, value: Option<&str>, location: &Location) {
        if value.is_some() {
            let error = ParseError::DetectionValue(name.to_owned());
            self.findings.error(Located::at(error, location.clone()));
        }

        // `pico.h` define `RASPBERRYPI_PICO` y `metrotech_xerxes_rp2040.h`
        // define `XERXES_RP2040`; se acepta un sufijo en cualquier sentido
        let expected = &self.expected.detection;
        if !(name.ends_with(expected.as_str()) || expected.ends_with(name)) {
            let error = ParseError::DetectionName {
                found: name.to_owned(),
                expected: expected.clone(),
            };

            self.findings.error(Located::at(error, location.clone()));
        }

        self.markers.detection = true;
    }

    fn check_suggestion(&mut self, path: String, location: Location) {
        if path != self.expected.include_path {
            let error = ParseError::SuggestionMismatch {
                found: path,
                expected: self.expected.include_path.clone(),
            };

            self.findings.error(Located::at(error, location));
        }

        self.markers.suggestion = true;
    }

    /// Desciende sobre un `#include` local.
    fn include(&mut self, path: &str, location: Location) -> Result<(), Located<ParseError>> {
        let file_name = Path::new(path).file_name();
        let acceptable = path.ends_with(".h") && (!path.contains('/') || path.starts_with("boards/"));

        let file_name = match file_name {
            Some(file_name) if acceptable => file_name,
            _ => {
                let error = ParseError::BadInclude(path.to_owned());
                self.findings.error(Located::at(error, location));
                return Ok(());
            }
        };

        // Los headers incluidos se buscan junto al header raíz
        let target = self.root_dir.join(file_name);
        if self.chain.contains(&target) {
            let chain = self
                .chain
                .iter()
                .chain(std::iter::once(&target))
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
                .join(" -> ");

            return Err(Located::at(ParseError::IncludeCycle(chain), location));
        }

        let source = match Source::load(&target) {
            Ok(source) => source,
            Err(error) => {
                let error = ParseError::Io {
                    path: target.display().to_string(),
                    error,
                };

                self.findings.error(Located::at(error, location));
                return Ok(());
            }
        };

        debug!(include = %target.display(), "entering include");

        self.chain.push(target);
        let result = self.scan_file(source, false);
        self.chain.pop();

        result
    }
}

/// Determina si un nombre tiene la forma `_BOARDS_<NOMBRE>_H`.
fn is_guard_name(name: &str) -> bool {
    name.len() > GUARD_PREFIX.len() + GUARD_SUFFIX.len()
        && name.starts_with(GUARD_PREFIX)
        && name.ends_with(GUARD_SUFFIX)
}

/// Mayúsculas, con todo carácter que no sea de palabra reemplazado por `_`.
fn to_macro_name(text: &str) -> String {
    text.chars()
        .flat_map(char::to_uppercase)
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LocatedError;
    use std::fs;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    fn messages(findings: &Findings) -> Vec<String> {
        findings
            .errors
            .iter()
            .map(|error| error.source().to_string())
            .collect()
    }

    #[test]
    fn expected_names() {
        let names = ExpectedNames::for_path(Path::new("src/boards/include/boards/pico-w.h"));

        assert_eq!(names.include_path, "boards/pico-w.h");
        assert_eq!(names.guard, "_BOARDS_PICO_W_H");
        assert_eq!(names.detection, "PICO_W");
    }

    #[test]
    fn guard_names() {
        assert!(is_guard_name("_BOARDS_PICO_H"));
        assert!(!is_guard_name("_BOARDS__H"));
        assert!(!is_guard_name("BOARDS_PICO_H"));
    }

    #[test]
    fn conditionals_gate_defines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "foo.h",
            "#define ONE 1\n\
             #if ONE\n\
             #define A 1\n\
             #else\n\
             #define B 1\n\
             #endif\n\
             #if !ONE\n\
             #define C 1\n\
             #endif\n\
             #ifdef A\n\
             #ifndef A\n\
             #define D 1\n\
             #else\n\
             #define E 1\n\
             #endif\n\
             #endif\n",
        );

        let mut findings = Findings::new();
        let board = scan(&path, &mut findings).unwrap();
        let symbols = board.symbols();

        assert!(symbols.lookup("A").is_some());
        assert!(symbols.lookup("B").is_none());
        assert!(symbols.lookup("C").is_none());
        assert!(symbols.lookup("D").is_none());
        assert!(symbols.lookup("E").is_some());
        assert!(findings.errors.is_empty(), "{:?}", findings.errors);
    }

    #[test]
    fn nested_if_in_inactive_branch_is_not_evaluated() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "foo.h",
            "#ifdef NOPE\n#if UNDECLARED\n#define A 1\n#endif\n#endif\n",
        );

        let mut findings = Findings::new();
        let board = scan(&path, &mut findings).unwrap();

        assert!(findings.errors.is_empty(), "{:?}", findings.errors);
        assert!(board.symbols().lookup("A").is_none());
    }

    #[test]
    fn undeclared_if_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "foo.h", "#if UNDECLARED\n#define A 1\n#endif\n");

        let mut findings = Findings::new();
        let board = scan(&path, &mut findings).unwrap();

        assert_eq!(messages(&findings), vec!["`#if UNDECLARED` refers to an undefined name"]);
        assert!(board.symbols().lookup("A").is_none());
    }

    #[test]
    fn unbalanced_conditionals_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let unterminated = write(dir.path(), "a.h", "#ifndef X\n#ifdef Y\n#endif\n");
        let stray = write(dir.path(), "b.h", "#endif\n#define LATER 1\n");

        let mut findings = Findings::new();
        let error = scan(&unterminated, &mut findings).err().unwrap();
        assert!(matches!(
            error.val(),
            ParseError::Nesting(NestingError::Unterminated(1))
        ));

        let error = scan(&stray, &mut findings).err().unwrap();
        assert!(matches!(
            error.val(),
            ParseError::Nesting(NestingError::UnbalancedEndif)
        ));
        assert_eq!(error.location().line_number(), Some(1));
    }

    #[test]
    fn includes_share_the_symbol_table() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "base.h", "#define BASE_LED 25\n");
        let path = write(
            dir.path(),
            "derived.h",
            "#include \"boards/base.h\"\n#define PICO_DEFAULT_LED_PIN BASE_LED\n",
        );

        let mut findings = Findings::new();
        let board = scan(&path, &mut findings).unwrap();

        let led = board.symbols().lookup("PICO_DEFAULT_LED_PIN").unwrap();
        assert_eq!(led.resolved(), Some(&Value::Int(25)));
        assert!(findings.errors.is_empty(), "{:?}", findings.errors);
    }

    #[test]
    fn include_cycles_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.h", "#include \"b.h\"\n");
        write(dir.path(), "b.h", "#include \"a.h\"\n");

        let mut findings = Findings::new();
        let error = scan(&dir.path().join("a.h"), &mut findings).err().unwrap();

        assert!(matches!(error.val(), ParseError::IncludeCycle(_)));
    }

    #[test]
    fn bad_and_missing_includes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "foo.h",
            "#include \"other/x.h\"\n#include \"x.c\"\n#include \"missing.h\"\n",
        );

        let mut findings = Findings::new();
        scan(&path, &mut findings).unwrap();

        assert_eq!(findings.errors.len(), 3);
    }

    #[test]
    fn ifndef_define_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "foo.h", "#ifndef PICO_A\n#define PICO_B 1\n#endif\n");

        let mut findings = Findings::new();
        scan(&path, &mut findings).unwrap();

        assert_eq!(messages(&findings), vec!["`#ifndef PICO_A` / `#define PICO_B` mismatch"]);
    }

    #[test]
    fn guard_must_be_first_and_valueless() {
        let dir = tempfile::tempdir().unwrap();
        let boards = dir.path().join("boards");
        fs::create_dir(&boards).unwrap();
        let path = write(
            &boards,
            "foo.h",
            "#define PICO_EARLY 1\n#ifndef _BOARDS_FOO_H\n#define _BOARDS_FOO_H 1\n#endif\n",
        );

        let mut findings = Findings::new();
        let board = scan(&path, &mut findings).unwrap();

        assert!(board.markers().guard);
        assert_eq!(
            messages(&findings),
            vec![
                "Include-guard `#define _BOARDS_FOO_H` shouldn't have a value",
                "Include-guard `#define _BOARDS_FOO_H` should be the first define",
            ]
        );
    }

    #[test]
    fn board_detection_symmetry() {
        let dir = tempfile::tempdir().unwrap();
        let boards = dir.path().join("boards");
        fs::create_dir(&boards).unwrap();

        let suffix = write(&boards, "pico.h", "// For board detection\n#define RASPBERRYPI_PICO\n");
        let prefix = write(
            &boards,
            "metrotech_xerxes_rp2040.h",
            "// For board detection\n#define XERXES_RP2040\n",
        );
        let wrong = write(&boards, "other.h", "// For board detection\n#define SOMETHING 1\n");

        let mut findings = Findings::new();
        assert!(scan(&suffix, &mut findings).unwrap().markers().detection);
        assert!(scan(&prefix, &mut findings).unwrap().markers().detection);
        assert!(findings.errors.is_empty(), "{:?}", findings.errors);

        scan(&wrong, &mut findings).unwrap();
        assert_eq!(
            messages(&findings),
            vec![
                "Board-detection `#define SOMETHING` shouldn't have a value",
                "Board-detection `#define SOMETHING` should end with `OTHER`",
            ]
        );
    }

    #[test]
    fn legacy_settings_and_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "foo.h",
            "// pico_cmake_set PICO_PLATFORM=rp2040\n#define pico_thing 1\n",
        );

        let mut findings = Findings::new();
        let board = scan(&path, &mut findings).unwrap();

        let messages = messages(&findings);
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("pico_board_cmake_set(PICO_PLATFORM, rp2040)"));
        assert_eq!(messages[1], "Expected `pico_thing` to be all uppercase");

        // La declaración antigua igual se registra
        assert!(board
            .symbols()
            .setting(lex::SettingKind::Set, "PICO_PLATFORM")
            .is_some());
    }
}
