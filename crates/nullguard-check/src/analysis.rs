//! Per-function flow-sensitive analysis driver.
//!
//! Forward dataflow in reverse postorder over the function's CFG. Each block
//! is re-transferred until states stabilize, with widening applied on
//! revisits so loops converge; both the SAT solver and the fixpoint carry
//! budgets that surface as recoverable `AnalysisError`s.

use std::collections::HashMap;

use nullguard_ir::cfg::Cfg;
use nullguard_ir::ir::*;
use nullguard_solver::{FormulaId, Solver, SolverConfig, SolverError};

use crate::env::{
    BlockState, DeclKey, LocId, NullState, PointerValue, Slot, ValId, Value, ValueArena,
};
use crate::lattice::NonFlowSensitiveState;
use crate::tnv::{nullability_from_type, SymbolicNullability};

/// Budgets for one function analysis. Empirical, never hard-coded at use
/// sites.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisConfig {
    pub max_sat_steps: u64,
    pub max_block_visits: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_sat_steps: 2_000_000,
            max_block_visits: 20_000,
        }
    }
}

/// Recoverable per-function failures.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("sat solver budget exhausted")]
    SolverLimit,
    #[error("block visit budget exceeded")]
    BlockLimit,
    #[error("function `{0}` has no body")]
    NoBody(String),
}

impl From<SolverError> for AnalysisError {
    fn from(_: SolverError) -> Self {
        AnalysisError::SolverLimit
    }
}

/// A program point the diagnoser or evidence collector may act on. Sites are
/// reported after the transfer of the corresponding node.
#[derive(Debug, Clone, Copy)]
pub enum Site {
    Expr(ExprId),
    Return { value: ExprId },
    MemberInit { field: DeclId, init: ExprId },
    Abort { arg: ExprId },
}

/// Converged dataflow states: per-block OUT states plus the seeded entry
/// state for replays.
pub struct FixpointStates {
    pub out_states: HashMap<BlockId, BlockState>,
    pub entry: BlockState,
}

/// One function analysis run: owns the solver, the value arena, and the
/// non-flow-sensitive state.
pub struct FunctionAnalysis<'tu> {
    pub tu: &'tu TranslationUnit,
    pub func: DeclId,
    pub fdecl: &'tu FunctionDecl,
    pub body: &'tu Body,
    pub cfg: Cfg<'tu>,
    pub solver: Solver,
    pub arena: ValueArena,
    pub nfs: NonFlowSensitiveState,
    config: AnalysisConfig,
    default_kind: Option<NullabilityKind>,
    block_conds: HashMap<BlockId, Option<FormulaId>>,
    /// Stable storage locations for named objects; block re-visits must
    /// observe the same location or the fixpoint cannot terminate.
    decl_loc_memo: HashMap<DeclKey, LocId>,
    /// Stable result-object and reference-return locations, keyed by
    /// expression.
    result_locs: HashMap<ExprId, LocId>,
}

impl<'tu> FunctionAnalysis<'tu> {
    pub fn new(
        tu: &'tu TranslationUnit,
        func: DeclId,
        config: AnalysisConfig,
        overrides: HashMap<(DeclId, u32), SymbolicNullability>,
    ) -> Result<Self, AnalysisError> {
        let decl = tu.decl(func);
        let fdecl = tu
            .function(func)
            .ok_or_else(|| AnalysisError::NoBody(decl.name.clone()))?;
        let body = fdecl
            .body
            .as_ref()
            .ok_or_else(|| AnalysisError::NoBody(decl.name.clone()))?;
        let cfg = Cfg::from_body(body);
        let default_kind = decl
            .span
            .as_ref()
            .map(|s| s.file.as_str())
            .or(Some(tu.main_file.as_str()))
            .and_then(|f| tu.pragma_default(f));
        Ok(Self {
            tu,
            func,
            fdecl,
            body,
            cfg,
            solver: Solver::new(SolverConfig {
                max_steps: config.max_sat_steps,
            }),
            arena: ValueArena::new(),
            nfs: NonFlowSensitiveState::with_overrides(overrides),
            config,
            default_kind,
            block_conds: HashMap::new(),
            decl_loc_memo: HashMap::new(),
            result_locs: HashMap::new(),
        })
    }

    /// The stable storage location of a named object.
    pub(crate) fn decl_loc(&mut self, key: DeclKey, ty: TypeId) -> LocId {
        if let Some(&loc) = self.decl_loc_memo.get(&key) {
            return loc;
        }
        let loc = self.arena.new_loc(ty);
        self.decl_loc_memo.insert(key, loc);
        loc
    }

    /// The stable location of an expression's result object (or
    /// reference-return storage).
    pub(crate) fn result_loc(&mut self, e: ExprId, ty: TypeId) -> LocId {
        if let Some(&loc) = self.result_locs.get(&e) {
            return loc;
        }
        let loc = self.arena.new_loc(ty);
        self.result_locs.insert(e, loc);
        loc
    }

    /// Pragma default for unannotated pointers in this function's file.
    pub fn default_kind(&self) -> Option<NullabilityKind> {
        self.default_kind
    }

    /// Pragma default for the file a referenced declaration lives in.
    pub fn default_for_decl(&self, decl: DeclId) -> Option<NullabilityKind> {
        match &self.tu.decl(decl).span {
            Some(span) => self.tu.pragma_default(&span.file),
            None => self.default_kind,
        }
    }

    /// Install fresh symbolic nullability variables for every parameter of
    /// the analyzed function. Used in inference mode so the evidence pass
    /// can observe which parameter facts the body commits to.
    pub fn assign_symbolic_params(&mut self) {
        for i in 0..self.fdecl.params.len() {
            let nonnull = self.solver.mk_atom();
            let nullable = self.solver.mk_atom();
            self.nfs.slot_overrides.insert(
                (self.func, i as u32 + 1),
                SymbolicNullability::Symbolic { nonnull, nullable },
            );
        }
    }

    /// Run the forward dataflow to fixpoint.
    pub fn run(&mut self) -> Result<FixpointStates, AnalysisError> {
        let entry = self.seed_entry();
        let rpo = self.cfg.reverse_postorder();
        let mut out: HashMap<BlockId, BlockState> = HashMap::new();
        let mut visits: u32 = 0;
        let mut changed = true;

        while changed {
            changed = false;
            for &bid in &rpo {
                visits += 1;
                if visits > self.config.max_block_visits {
                    return Err(AnalysisError::BlockLimit);
                }
                let Some(block) = self.cfg.block(bid) else {
                    continue;
                };
                let mut state = if bid == 0 {
                    entry.clone()
                } else {
                    self.merge_predecessors(bid, &out)?
                };
                for stmt in &block.stmts {
                    self.walk_stmt(&mut state, stmt)?;
                }
                if let Some(cond) = block.condition {
                    let mut sink = Vec::new();
                    self.transfer_expr(&mut state, cond, &mut sink)?;
                }
                self.record_block_cond(bid, block, &state);

                let next = match out.get(&bid) {
                    Some(prev) => self.widen(prev, state)?,
                    None => state,
                };
                if out.get(&bid) != Some(&next) {
                    out.insert(bid, next);
                    changed = true;
                }
            }
        }

        Ok(FixpointStates {
            out_states: out,
            entry,
        })
    }

    /// Seed the entry state: storage and annotation-derived null states for
    /// `this` and every parameter.
    fn seed_entry(&mut self) -> BlockState {
        let tu = self.tu;
        let fdecl = self.fdecl;
        let mut state = BlockState::new(self.solver.lit(true));

        if let Some(rec) = fdecl.parent_record {
            let loc = self.decl_loc(DeclKey::This, rec);
            state.env.decl_locs.insert(DeclKey::This, loc);
        }

        for (i, param) in fdecl.params.iter().enumerate() {
            let slot = Slot {
                decl: self.func,
                index: i as u32 + 1,
            };
            let vty = tu.non_reference(param.ty);
            let key = DeclKey::Param(self.func, i as u32);
            let loc = self.decl_loc(key, vty);
            state.env.decl_locs.insert(key, loc);

            let mut vector = nullability_from_type(tu, param.ty, self.default_kind);
            self.nfs.apply_slot_override((self.func, slot.index), &mut vector);
            let outer = vector.first().copied();

            if tu.is_raw_pointer(vty) {
                let val = self.fresh_pointer(vty, outer, Some(slot));
                state.env.store.insert(loc, val);
            } else if let Some(raw) = tu.smart_ptr_raw(vty) {
                let synth = self.arena.synth_loc(loc, raw);
                let val = self.fresh_pointer(raw, outer, Some(slot));
                state.env.store.insert(synth, val);
            }
        }
        state
    }

    /// Transfer one statement, returning the sites it exposes.
    pub fn walk_stmt(
        &mut self,
        state: &mut BlockState,
        stmt: &Stmt,
    ) -> Result<Vec<Site>, AnalysisError> {
        let mut sites = Vec::new();
        match stmt {
            Stmt::Expr(e) => self.transfer_expr(state, *e, &mut sites)?,
            Stmt::Decl { decl, init } => {
                if let Some(init) = init {
                    self.transfer_expr(state, *init, &mut sites)?;
                }
                self.bind_local(state, *decl, *init);
            }
            Stmt::Return { value } => {
                if let Some(value) = value {
                    self.transfer_expr(state, *value, &mut sites)?;
                    sites.push(Site::Return { value: *value });
                }
            }
            Stmt::MemberInit { field, init } => {
                self.transfer_expr(state, *init, &mut sites)?;
                self.apply_member_init(state, *field, *init);
                sites.push(Site::MemberInit {
                    field: *field,
                    init: *init,
                });
            }
            Stmt::AbortIfNull { arg } => {
                self.transfer_expr(state, *arg, &mut sites)?;
                if let Some(ptr) = self.pointer_of(state, *arg) {
                    if let Some(is_null) = ptr.null.is_null {
                        let not_null = self.solver.mk_not(is_null);
                        state.env.flow = self.solver.mk_and(state.env.flow, not_null);
                    }
                }
                sites.push(Site::Abort { arg: *arg });
            }
        }
        Ok(sites)
    }

    /// Post-order transfer of an expression tree.
    pub fn transfer_expr(
        &mut self,
        state: &mut BlockState,
        e: ExprId,
        sites: &mut Vec<Site>,
    ) -> Result<(), AnalysisError> {
        for child in expr_children(&self.tu.expr(e).kind) {
            self.transfer_expr(state, child, sites)?;
        }
        self.transfer_type(e);
        self.transfer_value(state, e)?;
        sites.push(Site::Expr(e));
        Ok(())
    }

    fn bind_local(&mut self, state: &mut BlockState, decl: DeclId, init: Option<ExprId>) {
        let tu = self.tu;
        let DeclKind::Var(var) = &tu.decl(decl).kind else {
            return;
        };
        let vty = tu.non_reference(var.ty);

        if tu.is_smart_pointer(vty) {
            // The initializer is constructed directly into the variable.
            if let Some(init) = init {
                if let Some(&obj) = state.env.expr_locs.get(&init) {
                    state.env.decl_locs.insert(DeclKey::Var(decl), obj);
                    return;
                }
            }
            let loc = self.decl_loc(DeclKey::Var(decl), vty);
            state.env.decl_locs.insert(DeclKey::Var(decl), loc);
            return;
        }

        let loc = self.decl_loc(DeclKey::Var(decl), vty);
        state.env.decl_locs.insert(DeclKey::Var(decl), loc);
        if !tu.is_raw_pointer(vty) {
            if let Some(init) = init {
                if let Some(&v) = state.env.expr_vals.get(&init) {
                    state.env.store.insert(loc, v);
                }
            }
            return;
        }

        let val = match init.and_then(|i| state.env.expr_vals.get(&i).copied()) {
            Some(v) => v,
            None => {
                let mut vector = nullability_from_type(tu, var.ty, self.default_for_decl(decl));
                self.nfs.apply_slot_override((decl, 0), &mut vector);
                self.fresh_pointer(vty, vector.first().copied(), Some(Slot { decl, index: 0 }))
            }
        };
        state.env.store.insert(loc, val);
    }

    fn apply_member_init(&mut self, state: &mut BlockState, field: DeclId, init: ExprId) {
        let tu = self.tu;
        let DeclKind::Field(fd) = &tu.decl(field).kind else {
            return;
        };
        let Some(&this_loc) = state.env.decl_locs.get(&DeclKey::This) else {
            return;
        };
        let fty = tu.non_reference(fd.ty);
        if tu.is_raw_pointer(fty) {
            let floc = self.arena.field_loc(this_loc, field, fty);
            if let Some(&v) = state.env.expr_vals.get(&init) {
                state.env.store.insert(floc, v);
            }
        } else if let Some(raw) = tu.smart_ptr_raw(fty) {
            let floc = self.arena.field_loc(this_loc, field, fty);
            let synth = self.arena.synth_loc(floc, raw);
            if let Some(&src_obj) = state.env.expr_locs.get(&init) {
                if let Some(v) = self.smart_value(state, src_obj) {
                    state.env.store.insert(synth, v);
                }
            }
        }
    }

    fn record_block_cond(&mut self, bid: BlockId, block: &BasicBlock, state: &BlockState) {
        let cond = block.condition.and_then(|c| {
            match state.env.expr_vals.get(&c).map(|&v| self.arena.val(v)) {
                Some(Value::Bool(f)) => Some(f),
                _ => None,
            }
        });
        self.block_conds.insert(bid, cond);
    }

    fn edge_formula(&mut self, pred: BlockId, kind: EdgeKind) -> FormulaId {
        match kind {
            EdgeKind::Unconditional => self.solver.lit(true),
            EdgeKind::CondTrue | EdgeKind::CondFalse => {
                match self.block_conds.get(&pred).copied().flatten() {
                    Some(f) if kind == EdgeKind::CondTrue => f,
                    Some(f) => self.solver.mk_not(f),
                    None => self.solver.lit(true),
                }
            }
        }
    }

    /// Merge predecessor OUT states into this block's IN state, refining the
    /// flow condition along conditional edges.
    pub fn merge_predecessors(
        &mut self,
        bid: BlockId,
        out: &HashMap<BlockId, BlockState>,
    ) -> Result<BlockState, AnalysisError> {
        let preds: Vec<(BlockId, EdgeKind)> = self.cfg.predecessors(bid).to_vec();
        let mut acc: Option<BlockState> = None;
        for (pid, kind) in preds {
            let Some(pred_state) = out.get(&pid) else {
                continue;
            };
            let edge = self.edge_formula(pid, kind);
            let path_flow = self.solver.mk_and(pred_state.env.flow, edge);
            acc = Some(match acc {
                None => {
                    // Single predecessor so far: keep its state (and the
                    // const-method cache) intact under the refined flow.
                    let mut s = pred_state.clone();
                    s.env.flow = path_flow;
                    s.env.expr_vals.clear();
                    s.env.expr_locs.clear();
                    s
                }
                Some(a) => self.join(a, pred_state, path_flow)?,
            });
        }
        Ok(acc.unwrap_or_else(|| BlockState::new(self.solver.lit(false))))
    }

    /// Lattice join of two incoming states.
    fn join(
        &mut self,
        a: BlockState,
        b: &BlockState,
        b_flow: FormulaId,
    ) -> Result<BlockState, AnalysisError> {
        let flow = self.solver.mk_or(a.env.flow, b_flow);
        let mut merged = BlockState::new(flow);

        for (key, &loc) in &a.env.decl_locs {
            if b.env.decl_locs.get(key) == Some(&loc) {
                merged.env.decl_locs.insert(*key, loc);
            }
        }
        for (loc, &va) in &a.env.store {
            let Some(&vb) = b.env.store.get(loc) else {
                continue;
            };
            let v = self.merge_values(va, a.env.flow, vb, b_flow)?;
            merged.env.store.insert(*loc, v);
        }
        // The const-method return cache is cleared conservatively on join:
        // a checked const-method value cannot be reused across the join.
        Ok(merged)
    }

    fn merge_values(
        &mut self,
        va: ValId,
        flow_a: FormulaId,
        vb: ValId,
        flow_b: FormulaId,
    ) -> Result<ValId, AnalysisError> {
        if va == vb {
            return Ok(va);
        }
        let merged = match (self.arena.val(va), self.arena.val(vb)) {
            (Value::Pointer(pa), Value::Pointer(pb)) => {
                let pointee = if pa.pointee == pb.pointee {
                    pa.pointee
                } else {
                    let ty = self.arena.loc_ty(pa.pointee);
                    self.arena.top_loc(ty)
                };
                let from_nullable = self.merge_formulas(
                    pa.null.from_nullable,
                    flow_a,
                    pb.null.from_nullable,
                    flow_b,
                )?;
                let is_null =
                    self.merge_formulas(pa.null.is_null, flow_a, pb.null.is_null, flow_b)?;
                let origin = if pa.origin == pb.origin {
                    pa.origin
                } else {
                    None
                };
                Value::Pointer(PointerValue {
                    pointee,
                    null: NullState {
                        from_nullable,
                        is_null,
                    },
                    origin,
                })
            }
            (Value::Bool(fa), Value::Bool(fb)) => {
                match self.merge_formulas(Some(fa), flow_a, Some(fb), flow_b)? {
                    Some(f) => Value::Bool(f),
                    None => return Ok(self.arena.top_val()),
                }
            }
            _ => return Ok(self.arena.top_val()),
        };
        Ok(self.arena.new_val(merged))
    }

    /// Merge two property formulas under their respective flow conditions.
    /// `None` ("top") on either side stays top.
    fn merge_formulas(
        &mut self,
        fa: Option<FormulaId>,
        flow_a: FormulaId,
        fb: Option<FormulaId>,
        flow_b: FormulaId,
    ) -> Result<Option<FormulaId>, AnalysisError> {
        if fa == fb {
            return Ok(fa);
        }
        let (Some(a), Some(b)) = (fa, fb) else {
            return Ok(None);
        };
        if self.proves_under(flow_a, a)? && self.proves_under(flow_b, b)? {
            return Ok(Some(self.solver.lit(true)));
        }
        let na = self.solver.mk_not(a);
        let nb = self.solver.mk_not(b);
        if self.proves_under(flow_a, na)? && self.proves_under(flow_b, nb)? {
            return Ok(Some(self.solver.lit(false)));
        }
        // Tie the merged atom to whichever path was taken.
        let merged = self.solver.mk_atom();
        let eq_a = self.solver.mk_equals(merged, a);
        let eq_b = self.solver.mk_equals(merged, b);
        let side_a = self.solver.mk_and(flow_a, eq_a);
        let side_b = self.solver.mk_and(flow_b, eq_b);
        let tie = self.solver.mk_or(side_a, side_b);
        self.solver.add_assumption(tie);
        Ok(Some(merged))
    }

    fn proves_under(&mut self, flow: FormulaId, f: FormulaId) -> Result<bool, SolverError> {
        let imp = self.solver.mk_implies(flow, f);
        self.solver.prove(imp)
    }

    /// Widen the new state against the previous visit's state so loops
    /// converge: varying pointee locations go to the canonical top location
    /// for their type, and properties not provably stable go to top.
    fn widen(
        &mut self,
        prev: &BlockState,
        cur: BlockState,
    ) -> Result<BlockState, AnalysisError> {
        let mut widened = cur;
        let prev_flow = prev.env.flow;
        let cur_flow = widened.env.flow;
        let locs: Vec<_> = widened.env.store.keys().copied().collect();
        for loc in locs {
            let cur_v = widened.env.store[&loc];
            let Some(&prev_v) = prev.env.store.get(&loc) else {
                continue;
            };
            if prev_v == cur_v {
                continue;
            }
            let v = self.widen_value(prev_v, prev_flow, cur_v, cur_flow)?;
            widened.env.store.insert(loc, v);
        }
        Ok(widened)
    }

    fn widen_value(
        &mut self,
        prev_v: ValId,
        prev_flow: FormulaId,
        cur_v: ValId,
        cur_flow: FormulaId,
    ) -> Result<ValId, AnalysisError> {
        match (self.arena.val(prev_v), self.arena.val(cur_v)) {
            (Value::Pointer(pp), Value::Pointer(pc)) => {
                let pointee = if pp.pointee == pc.pointee {
                    pc.pointee
                } else {
                    let ty = self.arena.loc_ty(pc.pointee);
                    self.arena.top_loc(ty)
                };
                let from_nullable = self.widen_formula(
                    pp.null.from_nullable,
                    prev_flow,
                    pc.null.from_nullable,
                    cur_flow,
                )?;
                let is_null =
                    self.widen_formula(pp.null.is_null, prev_flow, pc.null.is_null, cur_flow)?;
                let origin = if pp.origin == pc.origin {
                    pc.origin
                } else {
                    None
                };
                let content = PointerValue {
                    pointee,
                    null: NullState {
                        from_nullable,
                        is_null,
                    },
                    origin,
                };
                if content == pp {
                    // Already at the widened value; reuse it so the states
                    // compare equal and the fixpoint terminates.
                    Ok(prev_v)
                } else {
                    Ok(self.arena.new_val(Value::Pointer(content)))
                }
            }
            (Value::Bool(fp), Value::Bool(fc)) => {
                match self.widen_formula(Some(fp), prev_flow, Some(fc), cur_flow)? {
                    Some(f) if f == fp => Ok(prev_v),
                    Some(f) => Ok(self.arena.new_val(Value::Bool(f))),
                    None => Ok(self.arena.top_val()),
                }
            }
            _ => Ok(self.arena.top_val()),
        }
    }

    /// Widened property: kept only when provably stable across iterations,
    /// canonicalized to a literal so repeated widening reaches a fixed id.
    fn widen_formula(
        &mut self,
        prev: Option<FormulaId>,
        prev_flow: FormulaId,
        cur: Option<FormulaId>,
        cur_flow: FormulaId,
    ) -> Result<Option<FormulaId>, AnalysisError> {
        if prev == cur {
            return Ok(cur);
        }
        let (Some(p), Some(c)) = (prev, cur) else {
            return Ok(None);
        };
        if self.proves_under(prev_flow, p)? && self.proves_under(cur_flow, c)? {
            return Ok(Some(self.solver.lit(true)));
        }
        let np = self.solver.mk_not(p);
        let nc = self.solver.mk_not(c);
        if self.proves_under(prev_flow, np)? && self.proves_under(cur_flow, nc)? {
            return Ok(Some(self.solver.lit(false)));
        }
        Ok(None)
    }

    // ── Value helpers shared with the transferers and consumers ──────────

    pub(crate) fn fresh_pointer(
        &mut self,
        ptr_ty: TypeId,
        outer: Option<SymbolicNullability>,
        origin: Option<Slot>,
    ) -> ValId {
        let pointee_ty = match &self.tu.ty(ptr_ty).kind {
            TypeKind::Pointer { pointee, .. } => *pointee,
            _ => ptr_ty,
        };
        let pointee = self.arena.new_loc(pointee_ty);
        let null = self.null_state_from(outer);
        self.arena.new_val(Value::Pointer(PointerValue {
            pointee,
            null,
            origin,
        }))
    }

    /// Null-state initialization from a type's outer nullability entry.
    /// `Unspecified` pointers get fresh unconstrained atoms: nothing is
    /// known either way, so an unchecked dereference stays satisfiable-null
    /// until the flow condition rules it out. "Top" arises only from joins
    /// and widening.
    pub(crate) fn null_state_from(&mut self, outer: Option<SymbolicNullability>) -> NullState {
        match outer {
            Some(SymbolicNullability::Concrete(NullabilityKind::Nullable)) => NullState {
                from_nullable: Some(self.solver.lit(true)),
                is_null: Some(self.solver.lit(true)),
            },
            Some(SymbolicNullability::Concrete(NullabilityKind::Nonnull)) => NullState {
                from_nullable: Some(self.solver.lit(false)),
                is_null: Some(self.solver.lit(false)),
            },
            Some(SymbolicNullability::Symbolic { nonnull, nullable }) => {
                let not_nonnull = self.solver.mk_not(nonnull);
                let is_null = self.solver.mk_and(nullable, not_nonnull);
                NullState {
                    from_nullable: Some(nullable),
                    is_null: Some(is_null),
                }
            }
            _ => NullState {
                from_nullable: Some(self.solver.mk_atom()),
                is_null: Some(self.solver.mk_atom()),
            },
        }
    }

    pub fn value_of(&self, state: &BlockState, e: ExprId) -> Option<Value> {
        state.env.expr_vals.get(&e).map(|&v| self.arena.val(v))
    }

    pub fn pointer_of(&self, state: &BlockState, e: ExprId) -> Option<PointerValue> {
        match self.value_of(state, e) {
            Some(Value::Pointer(p)) => Some(p),
            _ => None,
        }
    }

    /// Does the solver admit a model where this pointer is null, under the
    /// current flow condition? Top `is_null` carries no claim.
    pub fn may_be_null(
        &mut self,
        state: &BlockState,
        ptr: &PointerValue,
    ) -> Result<bool, SolverError> {
        match ptr.null.is_null {
            Some(f) => {
                let q = self.solver.mk_and(state.env.flow, f);
                self.solver.satisfiable(q)
            }
            None => Ok(false),
        }
    }

    /// Is this pointer provably non-null under the current flow condition?
    pub fn provably_nonnull(
        &mut self,
        state: &BlockState,
        ptr: &PointerValue,
    ) -> Result<bool, SolverError> {
        match ptr.null.is_null {
            Some(f) => {
                let nf = self.solver.mk_not(f);
                let imp = self.solver.mk_implies(state.env.flow, nf);
                self.solver.prove(imp)
            }
            None => Ok(false),
        }
    }

    /// Concrete outer nullability of an expression, per the memoized vector.
    pub fn outer_kind(&self, e: ExprId) -> Option<NullabilityKind> {
        self.nfs
            .expr_nullability(e)
            .and_then(|v| v.first())
            .map(|sn| sn.concrete())
    }

    /// Peel value-preserving nodes to a direct function reference.
    pub fn direct_callee(&self, callee: ExprId) -> Option<(DeclId, &'tu [Option<TypeId>])> {
        let expr = self.tu.expr(callee);
        match &expr.kind {
            ExprKind::DeclRef {
                decl,
                template_args,
            } => match &self.tu.decl(*decl).kind {
                DeclKind::Function(_) => Some((*decl, template_args.as_slice())),
                _ => None,
            },
            ExprKind::Cast { operand, .. }
            | ExprKind::MaterializeTemporary { operand }
            | ExprKind::BindTemporary { operand } => self.direct_callee(*operand),
            _ => None,
        }
    }
}

/// Child expressions in evaluation order.
pub(crate) fn expr_children(kind: &ExprKind) -> Vec<ExprId> {
    match kind {
        ExprKind::DeclRef { .. }
        | ExprKind::ParamRef { .. }
        | ExprKind::This
        | ExprKind::NullLiteral
        | ExprKind::ValueInit
        | ExprKind::IntLiteral { .. }
        | ExprKind::BoolLiteral { .. }
        | ExprKind::New { .. } => vec![],
        ExprKind::Member { base, .. } => vec![*base],
        ExprKind::Call { callee, args } => {
            let mut v = vec![*callee];
            v.extend(args);
            v
        }
        ExprKind::MemberCall { base, args, .. } => {
            let mut v = vec![*base];
            v.extend(args);
            v
        }
        ExprKind::OperatorCall { args, .. } | ExprKind::Construct { args, .. } => args.clone(),
        ExprKind::Cast { operand, .. }
        | ExprKind::Unary { operand, .. }
        | ExprKind::MaterializeTemporary { operand }
        | ExprKind::BindTemporary { operand } => vec![*operand],
        ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
        ExprKind::ArraySubscript { base, index } => vec![*base, *index],
        ExprKind::AssertNullability { arg, .. } => vec![*arg],
    }
}
