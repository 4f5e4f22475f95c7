//! Tablas de símbolos con alcance léxico.
//!
//! Los alcances forman una cadena: cada bloque abre un nuevo marco
//! cuyo padre es el marco actual, y lo descarta al terminar. Los marcos
//! viven en un arreglo y referencian a su padre por índice, por lo cual
//! la tabla es dueña de todos ellos.
//!
//! El contenido de cada entrada depende de la fase: valores durante
//! interpretación, tipos durante análisis semántico y variables de IR
//! durante generación de código intermedio.

use crate::lex::Identifier;
use std::collections::HashMap;

/// Índice de un marco dentro de la tabla.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct ScopeId(usize);

/// Cadena de alcances léxicos.
pub struct SymbolTable<T> {
    frames: Vec<Frame<T>>,
    current: ScopeId,
}

struct Frame<T> {
    parent: Option<ScopeId>,
    symbols: HashMap<Identifier, T>,
}

impl<T> SymbolTable<T> {
    /// Crea una tabla con un único marco raíz, vacío.
    pub fn new() -> Self {
        SymbolTable {
            frames: vec![Frame {
                parent: None,
                symbols: HashMap::new(),
            }],
            current: ScopeId(0),
        }
    }

    /// Abre un marco anidado en el actual.
    pub fn enter(&mut self) {
        let id = ScopeId(self.frames.len());
        self.frames.push(Frame {
            parent: Some(self.current),
            symbols: HashMap::new(),
        });

        self.current = id;
    }

    /// Descarta el marco actual y regresa a su padre.
    ///
    /// # Panics
    /// El marco raíz no puede descartarse.
    pub fn leave(&mut self) {
        let frame = self.frames.pop().expect("symbol table has no frames");
        self.current = frame.parent.expect("attempted to leave the root scope");

        debug_assert_eq!(self.current.0 + 1, self.frames.len());
    }

    /// Define un símbolo en el marco actual.
    ///
    /// Si el nombre ya existía en este mismo marco, se reemplaza y se
    /// retorna la entrada anterior. Los marcos exteriores no se tocan.
    pub fn declare(&mut self, name: Identifier, value: T) -> Option<T> {
        self.frame_mut(self.current).symbols.insert(name, value)
    }

    /// Determina si un nombre está definido directamente en el marco actual.
    pub fn is_local(&self, name: &str) -> bool {
        self.frame(self.current).symbols.contains_key(name)
    }

    /// Busca un nombre desde el marco actual hacia afuera.
    pub fn lookup(&self, name: &str) -> Option<&T> {
        let id = self.resolve(name)?;
        self.frame(id).symbols.get(name)
    }

    /// Como [`SymbolTable::lookup()`], con acceso mutable.
    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut T> {
        let id = self.resolve(name)?;
        self.frame_mut(id).symbols.get_mut(name)
    }

    fn resolve(&self, name: &str) -> Option<ScopeId> {
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            let frame = self.frame(id);
            if frame.symbols.contains_key(name) {
                return Some(id);
            }

            scope = frame.parent;
        }

        None
    }

    fn frame(&self, ScopeId(index): ScopeId) -> &Frame<T> {
        &self.frames[index]
    }

    fn frame_mut(&mut self, ScopeId(index): ScopeId) -> &mut Frame<T> {
        &mut self.frames[index]
    }
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        SymbolTable::new()
    }
}

impl<T> FromIterator<(Identifier, T)> for SymbolTable<T> {
    /// Construye una tabla cuyo marco raíz contiene los símbolos dados.
    fn from_iter<I: IntoIterator<Item = (Identifier, T)>>(iter: I) -> Self {
        let mut table = SymbolTable::new();
        for (name, value) in iter {
            table.declare(name, value);
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identifier {
        Identifier::new(name)
    }

    #[test]
    fn lookup_walks_outward() {
        let mut table: SymbolTable<i32> = [(id("x"), 1)].into_iter().collect();

        table.enter();
        table.declare(id("y"), 2);
        assert_eq!(table.lookup("x"), Some(&1));
        assert_eq!(table.lookup("y"), Some(&2));

        table.leave();
        assert_eq!(table.lookup("y"), None);
    }

    #[test]
    fn inner_declarations_shadow() {
        let mut table = SymbolTable::new();
        table.declare(id("x"), "outer");

        table.enter();
        assert!(!table.is_local("x"));
        table.declare(id("x"), "inner");
        assert!(table.is_local("x"));
        assert_eq!(table.lookup("x"), Some(&"inner"));

        table.leave();
        assert_eq!(table.lookup("x"), Some(&"outer"));
    }

    #[test]
    fn assignment_through_the_chain() {
        let mut table = SymbolTable::new();
        table.declare(id("x"), 1);

        table.enter();
        *table.lookup_mut("x").unwrap() = 5;
        table.leave();

        assert_eq!(table.lookup("x"), Some(&5));
    }

    #[test]
    fn nested_scopes_unwind_in_order() {
        let mut table = SymbolTable::new();
        table.declare(id("x"), 0);

        table.enter();
        table.declare(id("x"), 1);
        table.enter();
        table.declare(id("x"), 2);
        assert_eq!(table.lookup("x"), Some(&2));

        table.leave();
        assert_eq!(table.lookup("x"), Some(&1));
        table.leave();
        assert_eq!(table.lookup("x"), Some(&0));
        assert!(table.is_local("x"));
    }

    #[test]
    #[should_panic(expected = "root scope")]
    fn root_scope_cannot_be_left() {
        let mut table: SymbolTable<()> = SymbolTable::new();
        table.leave();
    }

    #[test]
    fn redeclaration_returns_previous() {
        let mut table = SymbolTable::new();
        assert_eq!(table.declare(id("x"), 1), None);
        assert_eq!(table.declare(id("x"), 2), Some(1));
    }
}
