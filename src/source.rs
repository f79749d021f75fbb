//! Rastreo de ubicaciones originales en los headers.
//!
//! Todo lo que el validador construye a partir de un header (directivas,
//! definiciones, bindings de CMake) lleva cuenta del archivo y la línea
//! de donde proviene, lo cual permite reportar cada error en el punto
//! exacto donde ocurre.

use std::{
    fmt::{self, Debug, Display, Formatter},
    fs, io,
    path::{Path, PathBuf},
    rc::Rc,
};

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una ubicación está conformada por un origen y, opcionalmente, una línea.
///
/// Las ubicaciones sin línea se refieren al archivo como un todo, por
/// ejemplo cuando falta una definición obligatoria.
#[derive(Clone)]
pub struct Location {
    from: Rc<Source>,
    line: Option<u32>,
}

impl Location {
    /// Ubicación de una línea específica, contando desde 1.
    pub fn line(source: &Rc<Source>, line: u32) -> Self {
        Location {
            from: Rc::clone(source),
            line: Some(line),
        }
    }

    /// Ubicación que abarca un archivo completo.
    pub fn file(source: &Rc<Source>) -> Self {
        Location {
            from: Rc::clone(source),
            line: None,
        }
    }

    /// Obtiene el número de línea, si lo hay.
    pub fn line_number(&self) -> Option<u32> {
        self.line
    }

    /// Obtiene el origen.
    pub fn source(&self) -> &Source {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(formatter, "{}:{}", self.from.name, line),
            None => write!(formatter, "{}", self.from.name),
        }
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Nombre de origen y contenido por líneas de un archivo.
pub struct Source {
    name: String,
    path: PathBuf,
    lines: Vec<String>,
}

impl Source {
    /// Lee un archivo completo.
    ///
    /// El nombre de origen es la ruta tal como fue indicada, que es
    /// también la forma en que se muestra en los diagnósticos.
    pub fn load(path: &Path) -> io::Result<Rc<Self>> {
        let text = fs::read_to_string(path)?;
        Ok(Rc::new(Source::new(path, &text)))
    }

    /// Construye a partir de un texto ya leído.
    pub fn new(path: &Path, text: &str) -> Self {
        Source {
            name: path.display().to_string(),
            path: path.to_path_buf(),
            lines: text.lines().map(String::from).collect(),
        }
    }

    /// Nombre de origen.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ruta del archivo.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Itera las líneas junto a su número, comenzando en 1.
    pub fn numbered_lines(&self) -> impl Iterator<Item = (u32, &str)> {
        self.lines
            .iter()
            .enumerate()
            .map(|(index, line)| (index as u32 + 1, line.as_str()))
    }

    /// Invoca a `callback` con el contenido de una línea, si existe.
    pub fn with_line<F, R>(&self, line: u32, callback: F) -> Option<R>
    where
        F: FnOnce(&str) -> R,
    {
        let index = (line as usize).checked_sub(1)?;
        self.lines.get(index).map(|line| callback(line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_numbered_from_one() {
        let source = Rc::new(Source::new(Path::new("boards/foo.h"), "a\nb\n"));
        let lines: Vec<_> = source.numbered_lines().collect();

        assert_eq!(lines, vec![(1, "a"), (2, "b")]);
        assert_eq!(source.with_line(2, str::to_owned).as_deref(), Some("b"));
        assert_eq!(source.with_line(0, str::to_owned), None);
    }

    #[test]
    fn location_display() {
        let source = Rc::new(Source::new(Path::new("boards/foo.h"), ""));

        assert_eq!(Location::line(&source, 7).to_string(), "boards/foo.h:7");
        assert_eq!(Location::file(&source).to_string(), "boards/foo.h");
    }
}
