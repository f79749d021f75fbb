//! Validador de headers de definición de tarjetas.
//!
//! # Recorrido
//! Un header de tarjeta es un subconjunto restringido de C. Cada línea
//! se clasifica en [`lex`] como alguna [`lex::Directive`]. Las directivas
//! condicionales mantienen una pila de validez descrita en [`cond`], y
//! las demás alimentan la tabla de símbolos de [`symbols`] cuando la
//! rama actual está activa. Todo esto lo orquesta [`parse`], que además
//! desciende sobre inclusiones locales.
//!
//! # Validación
//! Con la tabla de símbolos completa, [`semantic`] determina el chip
//! objetivo ([`chip`]), carga su esquema de capacidades ([`schema`]) y
//! verifica cada asignación de pines contra él.
//!
//! # Reporte
//! Ninguna fase se detiene ante el primer error. Todos los problemas se
//! acumulan en [`error::Diagnostics`] y se reportan juntos.

pub mod chip;
pub mod cond;
pub mod error;
pub mod lex;
pub mod parse;
pub mod schema;
pub mod semantic;
pub mod source;
pub mod symbols;

use std::path::{Path, PathBuf};

use bitflags::bitflags;
use tracing::debug;

use crate::{
    chip::Chip,
    error::{Diagnostics, Failure, Findings},
};

bitflags! {
    /// Verificaciones opcionales.
    pub struct CheckFlags: u32 {
        /// Exigir el comentario que sugiere cómo incluir el header.
        ///
        /// Muchos headers existentes no lo tienen, por lo que no se
        /// exige por defecto.
        const REQUIRE_INCLUDE_SUGGESTION = 0x01;

        /// Tratar advertencias como errores.
        const DENY_WARNINGS = 0x02;
    }
}

/// Parámetros de una validación.
#[derive(Clone, Debug)]
pub struct Options {
    /// Raíz del SDK, donde se encuentran los esquemas de capacidades.
    pub sdk: PathBuf,
    pub flags: CheckFlags,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            sdk: PathBuf::from("."),
            flags: CheckFlags::empty(),
        }
    }
}

/// Resultado de una validación exitosa.
#[derive(Debug)]
pub struct Report {
    chip: Chip,
    warnings: Diagnostics,
}

impl Report {
    /// Chip para el cual se validó el header.
    pub fn chip(&self) -> Chip {
        self.chip
    }

    pub fn warnings(&self) -> &Diagnostics {
        &self.warnings
    }
}

/// Valida un header de tarjeta.
pub fn check(header: &Path, options: &Options) -> Result<Report, Failure> {
    let mut findings = Findings::new();

    let board = match parse::scan(header, &mut findings) {
        Ok(board) => board,
        Err(fatal) => return Err(Failure::fatal(findings, fatal)),
    };

    debug!(
        header = %header.display(),
        defines = board.symbols().defines().len(),
        "header scanned"
    );

    let (chip, mut findings) = semantic::validate(&board, options, findings)?;
    if options.flags.contains(CheckFlags::DENY_WARNINGS) {
        findings.deny_warnings();
    }

    if !findings.errors.is_empty() {
        return Err(Failure::rejected(findings));
    }

    Ok(Report {
        chip,
        warnings: findings.warnings,
    })
}
