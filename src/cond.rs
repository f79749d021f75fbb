//! Compilación condicional.
//!
//! Un [`ValidityStack`] lleva cuenta de cuáles ramas de `#if`/`#ifdef`/
//! `#ifndef` anidados están activas. La cima de la pila indica si la
//! línea actual debe tomarse en cuenta.

use thiserror::Error;

/// Errores de anidamiento. Todos son fatales.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum NestingError {
    #[error("`#else` without a matching `#if`")]
    UnbalancedElse,

    #[error("`#endif` without a matching `#if`")]
    UnbalancedEndif,

    #[error("{0} conditional block(s) left open at end of file")]
    Unterminated(usize),
}

/// Pila de validez de ramas condicionales.
#[derive(Debug)]
pub struct ValidityStack(Vec<bool>);

impl ValidityStack {
    pub fn new() -> Self {
        ValidityStack(vec![true])
    }

    /// Indica si la rama actual está activa.
    pub fn is_active(&self) -> bool {
        self.0.last().copied().unwrap_or(false)
    }

    /// Cantidad de condicionales abiertos.
    pub fn depth(&self) -> usize {
        self.0.len() - 1
    }

    /// Entra a un condicional.
    ///
    /// Dentro de una rama inactiva toda rama anidada es inactiva, sin
    /// importar su condición.
    pub fn push(&mut self, condition: bool) {
        let active = self.is_active() && condition;
        self.0.push(active);
    }

    /// Procesa un `#else`.
    pub fn flip(&mut self) -> Result<(), NestingError> {
        let depth = self.depth();
        if depth == 0 {
            return Err(NestingError::UnbalancedElse);
        }

        let parent = self.0[depth - 1];
        let top = &mut self.0[depth];
        *top = parent && !*top;

        Ok(())
    }

    /// Procesa un `#endif`.
    pub fn pop(&mut self) -> Result<(), NestingError> {
        if self.depth() == 0 {
            return Err(NestingError::UnbalancedEndif);
        }

        self.0.pop();
        Ok(())
    }

    /// Verifica que al final del archivo no queden condicionales abiertos.
    pub fn finish(self) -> Result<(), NestingError> {
        match self.depth() {
            0 => Ok(()),
            open => Err(NestingError::Unterminated(open)),
        }
    }
}

impl Default for ValidityStack {
    fn default() -> Self {
        ValidityStack::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nesting() {
        let mut stack = ValidityStack::new();
        assert!(stack.is_active());

        stack.push(false);
        assert!(!stack.is_active());

        // Todo lo anidado en una rama inactiva es inactivo, incluso tras `#else`
        stack.push(true);
        assert!(!stack.is_active());
        stack.flip().unwrap();
        assert!(!stack.is_active());
        stack.pop().unwrap();

        stack.flip().unwrap();
        assert!(stack.is_active());
        stack.pop().unwrap();

        assert_eq!(stack.finish(), Ok(()));
    }

    #[test]
    fn unbalanced() {
        let mut stack = ValidityStack::new();
        assert_eq!(stack.pop(), Err(NestingError::UnbalancedEndif));
        assert_eq!(stack.flip(), Err(NestingError::UnbalancedElse));

        stack.push(true);
        stack.push(true);
        assert_eq!(stack.finish(), Err(NestingError::Unterminated(2)));
    }
}
