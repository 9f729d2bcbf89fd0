//! Storage locations, abstract values, and per-block flow state.

use std::collections::HashMap;

use nullguard_ir::ir::{DeclId, ExprId, TypeId};
use nullguard_solver::FormulaId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LocId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValId(pub u32);

/// Addressable slot of a declaration: 0 is the return (or declared) type,
/// 1..N are parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub decl: DeclId,
    pub index: u32,
}

/// Key for the storage location of a named object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKey {
    Var(DeclId),
    Param(DeclId, u32),
    This,
}

/// Flow-sensitive null state of one pointer value. `None` sides are "top".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullState {
    /// The static annotation claimed the pointer may be null.
    pub from_nullable: Option<FormulaId>,
    /// The pointer is currently null.
    pub is_null: Option<FormulaId>,
}

impl NullState {
    pub fn top() -> Self {
        Self {
            from_nullable: None,
            is_null: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerValue {
    /// Storage location of the pointee.
    pub pointee: LocId,
    pub null: NullState,
    /// Slot provenance, for evidence attribution.
    pub origin: Option<Slot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Pointer(PointerValue),
    Bool(FormulaId),
    Top,
}

/// Arena of locations and values for one function analysis run.
///
/// Locations are identities: field and synthetic-pointer locations are
/// memoized so every block state refers to the same `LocId` for the same
/// object. Values are immutable once created.
pub struct ValueArena {
    loc_types: Vec<TypeId>,
    vals: Vec<Value>,
    field_locs: HashMap<(LocId, DeclId), LocId>,
    synth_locs: HashMap<LocId, LocId>,
    /// Canonical widened locations, keyed by pointee type.
    top_locs: HashMap<TypeId, LocId>,
    top_val: ValId,
}

impl ValueArena {
    pub fn new() -> Self {
        let mut arena = Self {
            loc_types: Vec::new(),
            vals: Vec::new(),
            field_locs: HashMap::new(),
            synth_locs: HashMap::new(),
            top_locs: HashMap::new(),
            top_val: ValId(0),
        };
        arena.top_val = arena.new_val(Value::Top);
        arena
    }

    pub fn new_loc(&mut self, ty: TypeId) -> LocId {
        let id = LocId(self.loc_types.len() as u32);
        self.loc_types.push(ty);
        id
    }

    pub fn loc_ty(&self, loc: LocId) -> TypeId {
        self.loc_types[loc.0 as usize]
    }

    pub fn new_val(&mut self, value: Value) -> ValId {
        let id = ValId(self.vals.len() as u32);
        self.vals.push(value);
        id
    }

    pub fn val(&self, id: ValId) -> Value {
        self.vals[id.0 as usize]
    }

    pub fn top_val(&self) -> ValId {
        self.top_val
    }

    /// The location of `field` within the record at `record_loc`.
    pub fn field_loc(&mut self, record_loc: LocId, field: DeclId, field_ty: TypeId) -> LocId {
        if let Some(&loc) = self.field_locs.get(&(record_loc, field)) {
            return loc;
        }
        let loc = self.new_loc(field_ty);
        self.field_locs.insert((record_loc, field), loc);
        loc
    }

    /// The synthetic raw-pointer field of a smart pointer object.
    pub fn synth_loc(&mut self, record_loc: LocId, raw_ty: TypeId) -> LocId {
        if let Some(&loc) = self.synth_locs.get(&record_loc) {
            return loc;
        }
        let loc = self.new_loc(raw_ty);
        self.synth_locs.insert(record_loc, loc);
        loc
    }

    /// Canonical "top" location for pointees of `ty`, used by widening.
    pub fn top_loc(&mut self, ty: TypeId) -> LocId {
        if let Some(&loc) = self.top_locs.get(&ty) {
            return loc;
        }
        let loc = self.new_loc(ty);
        self.top_locs.insert(ty, loc);
        loc
    }
}

impl Default for ValueArena {
    fn default() -> Self {
        Self::new()
    }
}

/// Flow-sensitive environment of one program point.
#[derive(Debug, Clone)]
pub struct Env {
    pub decl_locs: HashMap<DeclKey, LocId>,
    pub store: HashMap<LocId, ValId>,
    /// Flow condition at this point.
    pub flow: FormulaId,
    /// Per-visit expression values (prvalues); not part of state equality.
    pub expr_vals: HashMap<ExprId, ValId>,
    /// Per-visit expression locations (glvalues); not part of state equality.
    pub expr_locs: HashMap<ExprId, LocId>,
}

impl Env {
    pub fn new(flow: FormulaId) -> Self {
        Self {
            decl_locs: HashMap::new(),
            store: HashMap::new(),
            flow,
            expr_vals: HashMap::new(),
            expr_locs: HashMap::new(),
        }
    }
}

/// Per-CFG-block lattice element: environment plus the const-method return
/// cache. The cache does not take part in state equality; the join clears it
/// conservatively whenever it is non-empty.
#[derive(Debug, Clone)]
pub struct BlockState {
    pub env: Env,
    pub const_returns: HashMap<(LocId, DeclId), ValId>,
}

impl BlockState {
    pub fn new(flow: FormulaId) -> Self {
        Self {
            env: Env::new(flow),
            const_returns: HashMap::new(),
        }
    }
}

impl PartialEq for BlockState {
    fn eq(&self, other: &Self) -> bool {
        self.env.store == other.env.store
            && self.env.decl_locs == other.env.decl_locs
            && self.env.flow == other.env.flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_locs_are_stable() {
        let mut arena = ValueArena::new();
        let rec = arena.new_loc(7);
        let a = arena.field_loc(rec, 3, 1);
        let b = arena.field_loc(rec, 3, 1);
        assert_eq!(a, b);
        let other = arena.field_loc(rec, 4, 1);
        assert_ne!(a, other);
    }

    #[test]
    fn test_top_locs_keyed_by_type() {
        let mut arena = ValueArena::new();
        let a = arena.top_loc(5);
        let b = arena.top_loc(5);
        let c = arena.top_loc(6);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_block_state_equality_ignores_expr_maps_and_cache() {
        let mut arena = ValueArena::new();
        let solver = nullguard_solver::Solver::new(nullguard_solver::SolverConfig::default());
        let flow = solver.lit(true);
        let mut a = BlockState::new(flow);
        let mut b = BlockState::new(flow);
        let loc = arena.new_loc(0);
        let val = arena.new_val(Value::Top);
        a.env.store.insert(loc, val);
        b.env.store.insert(loc, val);
        a.env.expr_vals.insert(9, val);
        b.const_returns.insert((loc, 0), val);
        assert_eq!(a, b);
        b.env.store.remove(&loc);
        assert_ne!(a, b);
    }
}
