//! Clasificación de directivas.
//!
//! # Directivas
//! Esta es la primera fase del validador. Cada línea de un header se
//! reduce a exactamente una [`Directive`], o bien a
//! [`Directive::Unrecognized`] si no es parte del subconjunto de
//! preprocesador que se utiliza en headers de tarjetas. No se intenta
//! comprender C en general: solo condicionales sobre nombres simples,
//! `#define`, `#include` locales y las dos formas de declarar settings
//! de CMake.
//!
//! # Comentarios
//! Los comentarios de fin de línea se descartan antes de clasificar,
//! pero los comentarios de línea completa se preservan, ya que varias
//! directivas (detección de tarjeta, sugerencia de include y la forma
//! antigua de settings de CMake) viven dentro de ellos.

use thiserror::Error;

/// Forma antigua de un setting de CMake, dentro de un comentario.
const LEGACY_SET: &str = "pico_cmake_set";

/// Forma actual de un setting de CMake, como invocación.
const CALL_SET: &str = "pico_board_cmake_set";

/// Sufijo para settings que solo proveen un valor por defecto.
const DEFAULT_SUFFIX: &str = "_default";

const BOARD_DETECTION: &str = "For board detection";

const INCLUDE_SUGGESTION: &str = "This header may be included by other board headers as";

/// Problemas detectables a partir de una sola línea.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DirectiveError {
    /// Los nombres de macros y settings deben estar en mayúsculas.
    #[error("Expected `{0}` to be all uppercase")]
    Lowercase(String),

    /// Se utilizó la forma de comentario, que ya no se acepta.
    #[error("Legacy `// {legacy} {name}={value}` comment, use `{call}({name}, {value})` instead")]
    LegacyConfigDecl {
        legacy: &'static str,
        call: &'static str,
        name: String,
        value: String,
    },

    /// Condicional más allá de lo que este validador entiende.
    #[error("Unsupported conditional `{0}`, only `#if NAME`, `#if !NAME`, `#ifdef` and `#ifndef` are understood")]
    UnsupportedConditional(String),
}

/// Tipo de setting de CMake.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SettingKind {
    /// `pico_board_cmake_set`: valor fijo.
    Set,

    /// `pico_board_cmake_set_default`: valor por defecto.
    Default,
}

impl SettingKind {
    /// Nombre de la forma de invocación para este tipo.
    pub fn call_name(self) -> &'static str {
        match self {
            SettingKind::Set => "pico_board_cmake_set",
            SettingKind::Default => "pico_board_cmake_set_default",
        }
    }

    /// Nombre de la forma de comentario para este tipo.
    pub fn legacy_name(self) -> &'static str {
        match self {
            SettingKind::Set => "pico_cmake_set",
            SettingKind::Default => "pico_cmake_set_default",
        }
    }
}

/// Forma sintáctica en que se declaró un setting de CMake.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeclForm {
    /// `// pico_cmake_set NAME=VALUE`
    Comment,

    /// `pico_board_cmake_set(NAME, VALUE)`
    Call,
}

/// Una línea clasificada.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Declaración de un setting de CMake.
    ConfigDecl {
        form: DeclForm,
        kind: SettingKind,
        name: String,
        value: String,
    },

    /// `#else`
    Else,

    /// `#endif`
    EndIf,

    /// `#include "path"`
    Include(String),

    /// `#if NAME` o `#if !NAME`
    If { negated: bool, name: String },

    /// `#ifdef NAME`
    IfDef(String),

    /// `#ifndef NAME`
    IfNDef(String),

    /// `#define NAME` o `#define NAME VALUE`
    Define { name: String, value: Option<String> },

    /// `// For board detection`
    BoardDetection,

    /// `// This header may be included by other board headers as "path"`
    IncludeSuggestion(String),

    /// Cualquier otro `#if` o `#elif`.
    UnsupportedConditional(String),

    /// Todo lo demás.
    Unrecognized,
}

impl Directive {
    /// Clasifica una línea, ignorando comentarios finales.
    pub fn classify(line: &str) -> Directive {
        let line = strip_trailing_comment(line);
        let mut scanner = Scanner::new(line.trim());

        if scanner.eat("//") {
            return classify_comment(scanner);
        } else if scanner.eat("#") {
            return classify_hash(scanner);
        } else if scanner.eat(CALL_SET) {
            return classify_call(scanner).unwrap_or(Directive::Unrecognized);
        }

        Directive::Unrecognized
    }

    /// Nombre de macro o setting que introduce esta directiva, si alguno.
    pub fn name(&self) -> Option<&str> {
        use Directive::*;

        match self {
            ConfigDecl { name, .. } | If { name, .. } | Define { name, .. } => Some(name),
            IfDef(name) | IfNDef(name) => Some(name),
            _ => None,
        }
    }

    /// Indica si la directiva controla anidamiento de condicionales.
    ///
    /// Estas directivas se procesan aunque la rama actual esté inactiva.
    pub fn is_control_flow(&self) -> bool {
        use Directive::*;

        matches!(
            self,
            Else | EndIf | If { .. } | IfDef(_) | IfNDef(_) | UnsupportedConditional(_)
        )
    }
}

/// Determina si un nombre cumple con estar completamente en mayúsculas.
pub fn is_uppercase_name(name: &str) -> bool {
    !name.chars().any(char::is_lowercase)
}

fn classify_comment(mut scanner: Scanner<'_>) -> Directive {
    scanner.skip_whitespace();

    if scanner.rest().starts_with(BOARD_DETECTION) {
        return Directive::BoardDetection;
    }

    if scanner.eat(INCLUDE_SUGGESTION) {
        scanner.skip_whitespace();
        return match scanner.quoted() {
            Some(path) => Directive::IncludeSuggestion(path.to_owned()),
            None => Directive::Unrecognized,
        };
    }

    if !scanner.eat(LEGACY_SET) {
        return Directive::Unrecognized;
    }

    let kind = if scanner.eat(DEFAULT_SUFFIX) {
        SettingKind::Default
    } else {
        SettingKind::Set
    };

    // Se exige al menos un espacio tras la palabra clave
    if !scanner.skip_whitespace() {
        return Directive::Unrecognized;
    }

    let name = match scanner.word() {
        Some(name) => name,
        None => return Directive::Unrecognized,
    };

    scanner.skip_whitespace();
    if !scanner.eat("=") {
        return Directive::Unrecognized;
    }

    let value = scanner.rest().trim();
    if value.is_empty() {
        return Directive::Unrecognized;
    }

    Directive::ConfigDecl {
        form: DeclForm::Comment,
        kind,
        name: name.to_owned(),
        value: value.to_owned(),
    }
}

fn classify_call(mut scanner: Scanner<'_>) -> Option<Directive> {
    let kind = if scanner.eat(DEFAULT_SUFFIX) {
        SettingKind::Default
    } else {
        SettingKind::Set
    };

    scanner.skip_whitespace();
    if !scanner.eat("(") {
        return None;
    }

    scanner.skip_whitespace();
    let name = scanner.word()?;

    scanner.skip_whitespace();
    if !scanner.eat(",") {
        return None;
    }

    // El valor puede contener paréntesis propios: `(16 * 1024 * 1024)`
    let value = scanner.rest().trim_end().strip_suffix(')')?.trim();
    if value.is_empty() {
        return None;
    }

    Some(Directive::ConfigDecl {
        form: DeclForm::Call,
        kind,
        name: name.to_owned(),
        value: value.to_owned(),
    })
}

fn classify_hash(mut scanner: Scanner<'_>) -> Directive {
    scanner.skip_whitespace();
    let keyword = match scanner.word() {
        Some(keyword) => keyword,
        None => return Directive::Unrecognized,
    };

    let had_space = scanner.skip_whitespace();
    let rest = scanner.rest();

    match keyword {
        "else" if rest.is_empty() => Directive::Else,
        "endif" if rest.is_empty() => Directive::EndIf,

        "include" => match scanner.quoted() {
            Some(path) if scanner.rest().trim().is_empty() => Directive::Include(path.to_owned()),
            _ => Directive::Unrecognized,
        },

        "ifdef" => single_word(scanner).map_or_else(
            || Directive::UnsupportedConditional(format!("#ifdef {}", rest)),
            Directive::IfDef,
        ),

        "ifndef" => single_word(scanner).map_or_else(
            || Directive::UnsupportedConditional(format!("#ifndef {}", rest)),
            Directive::IfNDef,
        ),

        "if" => {
            let negated = scanner.eat("!");
            scanner.skip_whitespace();

            match single_word(scanner) {
                Some(name) => Directive::If { negated, name },
                None => Directive::UnsupportedConditional(format!("#if {}", rest)),
            }
        }

        "elif" => Directive::UnsupportedConditional(format!("#elif {}", rest)),

        "define" if had_space => {
            let name = match scanner.word() {
                Some(name) => name.to_owned(),
                None => return Directive::Unrecognized,
            };

            // `#define FOO(x)` es una macro de función, no una definición simple
            if !scanner.rest().is_empty() && !scanner.skip_whitespace() {
                return Directive::Unrecognized;
            }

            let value = Some(scanner.rest().trim()).filter(|value| !value.is_empty());
            Directive::Define {
                name,
                value: value.map(String::from),
            }
        }

        _ => Directive::Unrecognized,
    }
}

/// Exige que el resto de la línea sea exactamente un término.
fn single_word(mut scanner: Scanner<'_>) -> Option<String> {
    let word = scanner.word()?;
    scanner.skip_whitespace();

    if scanner.rest().is_empty() {
        Some(word.to_owned())
    } else {
        None
    }
}

/// Descarta un comentario `//` final que no esté entre comillas.
///
/// Solo se descarta si antes del comentario existe algún texto que no
/// sea espacio en blanco; los comentarios de línea completa se preservan.
pub fn strip_trailing_comment(line: &str) -> &str {
    let mut quoted = false;
    let mut seen_text = false;
    let mut chars = line.char_indices().peekable();

    while let Some((index, c)) = chars.next() {
        match c {
            '"' => quoted = !quoted,
            '/' if !quoted && matches!(chars.peek(), Some((_, '/'))) => {
                if seen_text {
                    return line[..index].trim_end();
                }

                return line;
            }

            _ => (),
        }

        seen_text |= !c.is_whitespace();
    }

    line
}

/// Cursor sobre el texto de una línea.
struct Scanner<'a> {
    rest: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Scanner { rest: text }
    }

    fn rest(&self) -> &'a str {
        self.rest
    }

    /// Consume un prefijo exacto, si está presente.
    fn eat(&mut self, prefix: &str) -> bool {
        match self.rest.strip_prefix(prefix) {
            Some(rest) => {
                self.rest = rest;
                true
            }

            None => false,
        }
    }

    /// Consume espacios en blanco. Indica si se consumió alguno.
    fn skip_whitespace(&mut self) -> bool {
        let trimmed = self.rest.trim_start();
        let skipped = trimmed.len() != self.rest.len();
        self.rest = trimmed;

        skipped
    }

    /// Consume un término formado por caracteres de palabra (`\w+`).
    fn word(&mut self) -> Option<&'a str> {
        let end = self
            .rest
            .find(|c: char| !is_word_char(c))
            .unwrap_or(self.rest.len());

        if end == 0 {
            return None;
        }

        let (word, rest) = self.rest.split_at(end);
        self.rest = rest;

        Some(word)
    }

    /// Consume un texto entre comillas dobles, retornando su contenido.
    fn quoted(&mut self) -> Option<&'a str> {
        let inner = self.rest.strip_prefix('"')?;
        let end = inner.find('"')?;
        if end == 0 {
            return None;
        }

        self.rest = &inner[end + 1..];
        Some(&inner[..end])
    }
}

/// Determina si un carácter puede pertenecer a un término.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn define(name: &str, value: Option<&str>) -> Directive {
        Directive::Define {
            name: name.into(),
            value: value.map(String::from),
        }
    }

    #[test]
    fn conditionals() {
        use Directive::*;

        assert_eq!(Directive::classify("#else"), Else);
        assert_eq!(Directive::classify("  #endif  "), EndIf);
        assert_eq!(Directive::classify("#endif // _BOARDS_FOO_H"), EndIf);
        assert_eq!(Directive::classify("#ifdef FOO"), IfDef("FOO".into()));
        assert_eq!(Directive::classify("#ifndef FOO"), IfNDef("FOO".into()));
        assert_eq!(
            Directive::classify("#if FOO"),
            If {
                negated: false,
                name: "FOO".into()
            }
        );
        assert_eq!(
            Directive::classify("#if !FOO"),
            If {
                negated: true,
                name: "FOO".into()
            }
        );
        assert_eq!(
            Directive::classify("# if ! FOO"),
            If {
                negated: true,
                name: "FOO".into()
            }
        );
    }

    #[test]
    fn complex_conditionals_are_flagged() {
        assert!(matches!(
            Directive::classify("#if defined(FOO) && BAR"),
            Directive::UnsupportedConditional(_)
        ));
        assert!(matches!(
            Directive::classify("#elif FOO"),
            Directive::UnsupportedConditional(_)
        ));
        assert!(Directive::classify("#elif FOO").is_control_flow());
        assert!(!Directive::classify("#define FOO 1").is_control_flow());
    }

    #[test]
    fn defines() {
        assert_eq!(Directive::classify("#define FOO"), define("FOO", None));
        assert_eq!(Directive::classify("#define FOO 42"), define("FOO", Some("42")));
        assert_eq!(
            Directive::classify("#define PICO_FLASH_SIZE_BYTES (16 * 1024 * 1024)"),
            define("PICO_FLASH_SIZE_BYTES", Some("(16 * 1024 * 1024)"))
        );
        assert_eq!(
            Directive::classify("#define PICO_DEFAULT_LED_PIN   25 // green"),
            define("PICO_DEFAULT_LED_PIN", Some("25"))
        );
        assert_eq!(Directive::classify("#define FOO(x) x"), Directive::Unrecognized);
        assert_eq!(Directive::classify("#definefoo"), Directive::Unrecognized);
    }

    #[test]
    fn includes() {
        assert_eq!(
            Directive::classify(r#"#include "boards/pico.h""#),
            Directive::Include("boards/pico.h".into())
        );
        assert_eq!(Directive::classify("#include <stdio.h>"), Directive::Unrecognized);
    }

    #[test]
    fn cmake_settings() {
        assert_eq!(
            Directive::classify("pico_board_cmake_set(PICO_PLATFORM, rp2350)"),
            Directive::ConfigDecl {
                form: DeclForm::Call,
                kind: SettingKind::Set,
                name: "PICO_PLATFORM".into(),
                value: "rp2350".into(),
            }
        );
        assert_eq!(
            Directive::classify("pico_board_cmake_set_default(PICO_FLASH_SIZE_BYTES, (4 * 1024 * 1024))"),
            Directive::ConfigDecl {
                form: DeclForm::Call,
                kind: SettingKind::Default,
                name: "PICO_FLASH_SIZE_BYTES".into(),
                value: "(4 * 1024 * 1024)".into(),
            }
        );
        assert_eq!(
            Directive::classify("// pico_cmake_set_default PICO_FLASH_SIZE_BYTES = (16 * 1024 * 1024)"),
            Directive::ConfigDecl {
                form: DeclForm::Comment,
                kind: SettingKind::Default,
                name: "PICO_FLASH_SIZE_BYTES".into(),
                value: "(16 * 1024 * 1024)".into(),
            }
        );
        assert_eq!(
            Directive::classify("// pico_cmake_set PICO_PLATFORM=rp2040"),
            Directive::ConfigDecl {
                form: DeclForm::Comment,
                kind: SettingKind::Set,
                name: "PICO_PLATFORM".into(),
                value: "rp2040".into(),
            }
        );
    }

    #[test]
    fn marker_comments() {
        assert_eq!(
            Directive::classify("// For board detection"),
            Directive::BoardDetection
        );
        assert_eq!(
            Directive::classify(
                r#"// This header may be included by other board headers as "boards/foo.h""#
            ),
            Directive::IncludeSuggestion("boards/foo.h".into())
        );
        assert_eq!(Directive::classify("// --- UART ---"), Directive::Unrecognized);
    }

    #[test]
    fn trailing_comments() {
        assert_eq!(strip_trailing_comment("#define A 1 // one"), "#define A 1");
        assert_eq!(strip_trailing_comment("// whole line"), "// whole line");
        assert_eq!(strip_trailing_comment("   // indented"), "   // indented");
        assert_eq!(
            strip_trailing_comment(r#"#include "a//b.h""#),
            r#"#include "a//b.h""#
        );
    }

    #[test]
    fn names_and_case() {
        assert_eq!(Directive::classify("#ifdef foo").name(), Some("foo"));
        assert_eq!(Directive::classify("#else").name(), None);
        assert!(is_uppercase_name("PICO_DEFAULT_I2C0_SDA_PIN"));
        assert!(!is_uppercase_name("Pico_LED"));
    }
}
