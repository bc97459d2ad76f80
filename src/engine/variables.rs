//! Scoped variable storage (spec.md §3 "variables", §9 "Scope chain").
//! `define <name> as <expr>` both declares and assigns; reads search from
//! the current substance scope outward.

use super::Engine;
use crate::error::EngineError;
use crate::quantity::Quantity;
use crate::types::ScopeKind;

impl Engine {
    fn scope_key(&self, kind: ScopeKind) -> String {
        match kind {
            ScopeKind::Global => String::new(),
            ScopeKind::Stanza => self.current_stanza.clone(),
            ScopeKind::Application => self.current_app.clone(),
            ScopeKind::Substance => format!("{}\u{1}{}", self.current_app, self.current_substance),
        }
    }

    /// Writes `value` to the innermost scope where `name` is already
    /// declared, or declares it in the current substance scope if nowhere
    /// found (this is how `define x as expr` both declares and assigns).
    pub fn set_variable(&mut self, name: &str, value: Quantity) {
        for kind in ScopeKind::READ_ORDER {
            let key = self.scope_key(kind);
            if let Some(scope) = self.variables.get_mut(&(kind, key)) {
                if scope.contains_key(name) {
                    scope.insert(name.to_string(), value);
                    return;
                }
            }
        }
        let key = self.scope_key(ScopeKind::Substance);
        self.variables
            .entry((ScopeKind::Substance, key))
            .or_default()
            .insert(name.to_string(), value);
    }

    pub fn get_variable(&self, name: &str) -> Result<Quantity, EngineError> {
        for kind in ScopeKind::READ_ORDER {
            let key = self.scope_key(kind);
            if let Some(scope) = self.variables.get(&(kind, key)) {
                if let Some(value) = scope.get(name) {
                    return Ok(*value);
                }
            }
        }
        Err(EngineError::UnknownVariable(name.to_string()))
    }
}
