//! Acumulación y reporte de errores.
//!
//! Ninguna fase del validador se detiene ante el primer problema. Cada
//! error se ubica con [`Located`] y se agrega a un [`Diagnostics`], el
//! cual se reporta completo al final. La única excepción son los errores
//! fatales ([`Failure::Fatal`]), tras los cuales no tiene sentido seguir.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Debug, Display},
};

use thiserror::Error;

mod sealed {
    pub trait Sealed {}
}

/// Un error asociado a una ubicación en algún header.
pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
}

/// Lista ordenada de errores o advertencias de una misma ejecución.
pub struct Diagnostics {
    kind: &'static str,
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl Diagnostics {
    pub fn kind(self, kind: &'static str) -> Self {
        Diagnostics { kind, ..self }
    }

    /// Agrega un error al final de la lista.
    pub fn push<E: Error + 'static>(&mut self, error: Located<E>) {
        self.errors.push(Box::new(error));
    }

    /// Mueve todos los errores de `other` al final de esta lista.
    pub fn append(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Itera los errores en el orden en que fueron encontrados.
    pub fn iter(&self) -> impl Iterator<Item = &dyn LocatedError> {
        self.errors.iter().map(|error| &**error)
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Diagnostics {
            kind: "error",
            errors: Default::default(),
        }
    }
}

impl<E: 'static + Error> From<Located<E>> for Diagnostics {
    fn from(error: Located<E>) -> Self {
        Diagnostics {
            errors: vec![Box::new(error)],
            ..Default::default()
        }
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Diagnostics { kind, errors } = self;

        if errors.is_empty() {
            return writeln!(fmt, "No errors were reported");
        }

        for error in errors {
            writeln!(fmt, "{}: {}", kind, error.source())?;

            let location = error.location();
            writeln!(fmt, " --> {}", location)?;

            let line_number = match location.line_number() {
                Some(line_number) => line_number,
                None => {
                    writeln!(fmt)?;
                    continue;
                }
            };

            let digits = line_number.to_string().len();
            writeln!(fmt, "{:digits$} |", "", digits = digits)?;

            location
                .source()
                .with_line(line_number, |line| {
                    writeln!(fmt, "{:>digits$} | {}", line_number, line, digits = digits)?;

                    let skip = line.len() - line.trim_start().len();
                    let highlight = line.trim().len().max(1);
                    writeln!(
                        fmt,
                        "{:digits$} | {:skip$}{:^<highlight$}",
                        "",
                        "",
                        "",
                        digits = digits,
                        skip = skip,
                        highlight = highlight
                    )
                })
                .unwrap_or(Ok(()))?;

            writeln!(fmt)?;
        }

        Ok(())
    }
}

impl Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_list()
            .entries(
                self.errors
                    .iter()
                    .map(|error| format!("{}: {}", error.location(), error.source())),
            )
            .finish()
    }
}

/// Errores y advertencias acumulados durante una misma ejecución.
pub struct Findings {
    pub errors: Diagnostics,
    pub warnings: Diagnostics,
}

impl Findings {
    pub fn new() -> Self {
        Findings {
            errors: Diagnostics::default(),
            warnings: Diagnostics::default().kind("warning"),
        }
    }

    /// Mueve las advertencias a la lista de errores.
    pub fn deny_warnings(&mut self) {
        let warnings = std::mem::replace(&mut self.warnings, Diagnostics::default().kind("warning"));
        self.errors.append(warnings);
    }

    pub fn error<E: Error + 'static>(&mut self, error: Located<E>) {
        self.errors.push(error);
    }

    pub fn warn<E: Error + 'static>(&mut self, warning: Located<E>) {
        self.warnings.push(warning);
    }
}

impl Default for Findings {
    fn default() -> Self {
        Findings::new()
    }
}

/// Resultado fallido de una validación.
#[derive(Error, Debug)]
pub enum Failure {
    /// El análisis no pudo completarse; no se intentaron más verificaciones.
    #[error("{errors}Validation aborted")]
    Fatal {
        errors: Diagnostics,
        warnings: Diagnostics,
    },

    /// El header fue analizado por completo y se encontraron violaciones.
    #[error("{errors}Validation failed with {count} {noun}", count = .errors.len(), noun = plural(.errors.len()))]
    Rejected {
        errors: Diagnostics,
        warnings: Diagnostics,
    },
}

impl Failure {
    /// Detiene la validación con un error fatal.
    pub fn fatal<E: Error + 'static>(findings: Findings, error: Located<E>) -> Self {
        let Findings {
            mut errors,
            warnings,
        } = findings;

        errors.push(error);
        Failure::Fatal { errors, warnings }
    }

    pub fn rejected(findings: Findings) -> Self {
        let Findings { errors, warnings } = findings;
        Failure::Rejected { errors, warnings }
    }

    /// Obtiene los errores, sin importar la severidad.
    pub fn diagnostics(&self) -> &Diagnostics {
        match self {
            Failure::Fatal { errors, .. } | Failure::Rejected { errors, .. } => errors,
        }
    }

    /// Advertencias encontradas antes de fallar.
    pub fn warnings(&self) -> &Diagnostics {
        match self {
            Failure::Fatal { warnings, .. } | Failure::Rejected { warnings, .. } => warnings,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Failure::Fatal { .. })
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "error"
    } else {
        "errors"
    }
}

impl<E: Error> sealed::Sealed for Located<E> {}

impl<E: Error> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }
}
