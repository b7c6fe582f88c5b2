use rustc_hash::FxHashMap;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use tracing::{debug, info, trace, warn};

use crate::creator::{BoolOf, FormulaCreator, FormulaOf, ListenerRef, NativeSymbol, SymbolListener};
use crate::error::{Result, SolverError};
use crate::generalized::{
    ConstantValue, Decl, GeneralConverter, GeneralSolver, Interrupter, SolverResult, Term, TermKind,
};
use crate::model::{Model, ModelOf};
use crate::options::Options;
use crate::shutdown::{ListenerId, ShutdownNotifier};
use crate::term::Symbol;

pub type PartitionId = usize;

struct Level<T, D> {
    /// Declarations made while this level was on top, in declaration order.
    symbols: Vec<Symbol<T, D>>,
    assertions: Vec<(Option<PartitionId>, T)>,
}

impl<T, D> Default for Level<T, D> {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            assertions: Vec::new(),
        }
    }
}

/// The part of a stack the formula creator notifies about new symbols.
struct StackCore<S: GeneralSolver> {
    solver: S,
    // levels[0] is the base frame below every push.
    levels: RefCell<Vec<Level<Term<S>, Decl<S>>>>,
    closed: Cell<bool>,
    replay_declarations: bool,
}

impl<S: GeneralSolver> StackCore<S> {
    fn depth(&self) -> usize {
        self.levels.borrow().len() - 1
    }

    fn add_symbol(&self, symbol: &Symbol<Term<S>, Decl<S>>) -> Result<()> {
        self.solver.declare(symbol)?;
        let mut levels = self.levels.borrow_mut();
        if levels.len() > 1 {
            if let Some(top) = levels.last_mut() {
                top.symbols.push(symbol.clone());
            }
        }
        Ok(())
    }

    /// Pops one level and hands back its assertions.
    fn pop_level(&self) -> Result<Vec<(Option<PartitionId>, Term<S>)>> {
        self.solver.pop()?;
        let removed = match self.levels.borrow_mut().pop() {
            Some(level) => level,
            None => return Err(SolverError::IllegalState("stack is empty".to_string())),
        };
        if !(self.replay_declarations && self.solver.forgets_declarations_on_pop()) {
            return Ok(removed.assertions);
        }
        trace!(symbols = removed.symbols.len(), "replaying declarations");
        for symbol in &removed.symbols {
            self.solver.declare(symbol)?;
        }
        let mut levels = self.levels.borrow_mut();
        if levels.len() > 1 {
            if let Some(top) = levels.last_mut() {
                top.symbols.extend(removed.symbols);
            }
        }
        Ok(removed.assertions)
    }
}

impl<S: GeneralSolver> SymbolListener<Term<S>, Decl<S>> for StackCore<S> {
    fn symbol_declared(&self, symbol: &Symbol<Term<S>, Decl<S>>) -> Result<()> {
        if self.closed.get() {
            return Ok(());
        }
        self.add_symbol(symbol)
    }
}

/// Incremental assert/push/pop session on top of one native solver.
///
/// Symbols declared through the creator stay visible after `pop`, even on
/// backends whose native pop discards them: the stack declares them again.
pub struct AssertionStack<S: GeneralSolver + 'static> {
    core: Rc<StackCore<S>>,
    creator: Rc<FormulaCreator<S::Converter>>,
    listener: ListenerRef<S::Converter>,
    notifier: ShutdownNotifier,
    interrupt_listener: ListenerId,
    use_for_interpolation: bool,
    log_all_queries: bool,
    min_atoms_for_abbreviation: usize,
    last_result: Cell<Option<SolverResult>>,
}

impl<S: GeneralSolver + 'static> AssertionStack<S> {
    /// Declares every symbol the creator knows of and subscribes to new ones.
    pub fn new<I: Interrupter + 'static>(
        creator: Rc<FormulaCreator<S::Converter>>,
        solver: S,
        interrupter: I,
        notifier: ShutdownNotifier,
        options: &Options,
        use_for_interpolation: bool,
    ) -> Result<Self> {
        for symbol in creator.declared_symbols() {
            solver.declare(&symbol)?;
        }
        let core = Rc::new(StackCore {
            solver,
            levels: RefCell::new(vec![Level::default()]),
            closed: Cell::new(false),
            replay_declarations: options.global_declarations,
        });
        let listener: Rc<dyn SymbolListener<Term<S>, Decl<S>>> = core.clone();
        let listener = Rc::downgrade(&listener);
        creator.register(listener.clone());
        let interrupt_listener = notifier.register(move |reason| {
            debug!(reason, "interrupting solver");
            interrupter.interrupt();
        });
        info!(use_for_interpolation, "assertion stack created");
        Ok(Self {
            core,
            creator,
            listener,
            notifier,
            interrupt_listener,
            use_for_interpolation,
            log_all_queries: options.log_all_queries,
            min_atoms_for_abbreviation: options.min_atoms_for_abbreviation,
            last_result: Cell::new(None),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.core.closed.get() {
            return Err(SolverError::IllegalState("assertion stack is closed".to_string()));
        }
        Ok(())
    }

    pub fn creator(&self) -> &Rc<FormulaCreator<S::Converter>> {
        &self.creator
    }

    pub fn solver(&self) -> &S {
        &self.core.solver
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.get()
    }

    /// Number of open levels.
    pub fn size(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.core.depth())
    }

    pub fn push(&self, n: usize) -> Result<()> {
        self.ensure_open()?;
        for _ in 0..n {
            self.core.solver.push()?;
            self.core.levels.borrow_mut().push(Level::default());
        }
        self.last_result.set(None);
        debug!(n, depth = self.core.depth(), "push");
        Ok(())
    }

    pub fn pop(&self, n: usize) -> Result<()> {
        self.ensure_open()?;
        let depth = self.core.depth();
        if n > depth {
            return Err(SolverError::IllegalState(format!(
                "cannot pop {} levels from a stack of depth {}",
                n, depth
            )));
        }
        self.pop_levels(n)?;
        self.last_result.set(None);
        debug!(n, depth = self.core.depth(), "pop");
        Ok(())
    }

    fn pop_levels(&self, n: usize) -> Result<()> {
        for _ in 0..n {
            for (_, term) in self.core.pop_level()? {
                self.creator.release(&term);
            }
        }
        Ok(())
    }

    /// Declares `symbol` in the native session and records it in the top level.
    pub fn add_symbol(&self, symbol: &NativeSymbol<S::Converter>) -> Result<()> {
        self.ensure_open()?;
        self.core.add_symbol(symbol)
    }

    pub fn assert_formula(&self, formula: &BoolOf<S::Converter>) -> Result<()> {
        self.assert_tagged(formula, None)
    }

    /// Asserts `formula` as part of `partition`. The tag applies to this formula only.
    pub fn assert_formula_in_partition(
        &self,
        formula: &BoolOf<S::Converter>,
        partition: PartitionId,
    ) -> Result<()> {
        self.assert_tagged(formula, Some(partition))
    }

    fn assert_tagged(&self, formula: &BoolOf<S::Converter>, partition: Option<PartitionId>) -> Result<()> {
        self.ensure_open()?;
        let term = self.creator.extract_boolean(formula)?;
        if self.log_all_queries {
            info!(target: "polysmt::queries", "(assert {})", self.creator.converter().dump(&term)?);
        }
        let shared = self.shared_subterms(&term)?;
        if !shared.is_empty() {
            trace!(count = shared.len(), "registering abbreviations");
            self.core.solver.register_abbreviations(&shared)?;
        }
        self.assert_term(term, partition)?;
        debug!(?partition, "assert");
        Ok(())
    }

    fn assert_term(&self, term: Term<S>, partition: Option<PartitionId>) -> Result<()> {
        self.core.solver.assert(&term)?;
        if let Some(top) = self.core.levels.borrow_mut().last_mut() {
            self.creator.hold(&term);
            top.assertions.push((partition, term));
        }
        self.last_result.set(None);
        Ok(())
    }

    /// Sub-terms reachable from more than one parent whose boolean skeleton
    /// holds at least `min_atoms_for_abbreviation` atoms.
    fn shared_subterms(&self, root: &Term<S>) -> Result<Vec<Term<S>>> {
        let converter = self.creator.converter();
        let mut parents: FxHashMap<Term<S>, usize> = FxHashMap::default();
        let mut order = Vec::new();
        let mut stack = vec![root.clone()];
        parents.insert(root.clone(), 0);
        while let Some(term) = stack.pop() {
            order.push(term.clone());
            if !is_connective(converter.term_kind(&term)?) {
                continue;
            }
            for child in converter.children(&term)? {
                let count = parents.entry(child.clone()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    stack.push(child);
                }
            }
        }
        let mut atoms: FxHashMap<Term<S>, usize> = FxHashMap::default();
        let mut pending = vec![(root.clone(), false)];
        while let Some((term, expanded)) = pending.pop() {
            if atoms.contains_key(&term) {
                continue;
            }
            if !is_connective(converter.term_kind(&term)?) {
                atoms.insert(term, 1);
                continue;
            }
            let children = converter.children(&term)?;
            if expanded {
                let count = children
                    .iter()
                    .map(|child| atoms.get(child).copied().unwrap_or(0))
                    .fold(0usize, usize::saturating_add);
                atoms.insert(term, count);
            } else {
                pending.push((term, true));
                pending.extend(
                    children
                        .into_iter()
                        .filter(|child| !atoms.contains_key(child))
                        .map(|child| (child, false)),
                );
            }
        }
        Ok(order
            .into_iter()
            .filter(|term| {
                parents.get(term).copied().unwrap_or(0) > 1
                    && atoms.get(term).copied().unwrap_or(0) >= self.min_atoms_for_abbreviation
            })
            .collect())
    }

    /// Whether the assertions are satisfiable. An inconclusive answer is an error.
    pub fn check_sat(&self) -> Result<bool> {
        self.ensure_open()?;
        self.notifier.shutdown_if_necessary()?;
        let result = self.core.solver.check_sat()?;
        self.last_result.set(Some(result));
        debug!(%result, depth = self.core.depth(), "check-sat");
        match result {
            SolverResult::Sat => Ok(true),
            SolverResult::Unsat => Ok(false),
            SolverResult::Unknown => {
                let reason = self
                    .core
                    .solver
                    .reason_unknown()
                    .unwrap_or_else(|| "unknown".to_string());
                warn!(%reason, "solver returned unknown");
                self.notifier.shutdown_if_necessary()?;
                Err(SolverError::Solver(format!("solver returned unknown: {}", reason)))
            }
        }
    }

    pub fn is_unsat(&self) -> Result<bool> {
        Ok(!self.check_sat()?)
    }

    /// One interpolant per cut between consecutive partition groups, so
    /// `n` groups yield `n - 1` formulas. Needs a preceding unsatisfiable check.
    pub fn get_interpolants(
        &self,
        groups: &[Vec<PartitionId>],
    ) -> Result<Vec<BoolOf<S::Converter>>> {
        self.ensure_open()?;
        if !self.use_for_interpolation {
            return Err(SolverError::IllegalState(
                "stack was not created for interpolation".to_string(),
            ));
        }
        if self.last_result.get() != Some(SolverResult::Unsat) {
            return Err(SolverError::IllegalState(
                "interpolants need an unsatisfiable check first".to_string(),
            ));
        }
        if groups.is_empty() || groups.iter().any(|group| group.is_empty()) {
            return Err(SolverError::InvalidArgument(
                "partition groups must not be empty".to_string(),
            ));
        }

        let mut common = Vec::new();
        let mut partitioned: FxHashMap<PartitionId, Vec<Term<S>>> = FxHashMap::default();
        for level in self.core.levels.borrow().iter() {
            for (partition, term) in &level.assertions {
                match partition {
                    Some(id) => partitioned.entry(*id).or_default().push(term.clone()),
                    None => common.push(term.clone()),
                }
            }
        }
        let side = |groups: &[Vec<PartitionId>]| -> Vec<Term<S>> {
            let mut terms = common.clone();
            for id in groups.iter().flatten() {
                if let Some(assertions) = partitioned.get(id) {
                    terms.extend(assertions.iter().cloned());
                }
            }
            terms
        };

        let mut interpolants = Vec::with_capacity(groups.len() - 1);
        for cut in 1..groups.len() {
            self.notifier.shutdown_if_necessary()?;
            let a = side(&groups[..cut]);
            let b = side(&groups[cut..]);
            debug!(cut, a = a.len(), b = b.len(), "interpolate");
            let interpolant = self.core.solver.interpolate(&a, &b)?;
            interpolants.push(self.creator.encapsulate_boolean(interpolant)?);
        }
        assert_eq!(interpolants.len(), groups.len() - 1, "one interpolant per cut");
        Ok(interpolants)
    }

    pub fn get_model(&self) -> Result<ModelOf<S::Converter>> {
        self.ensure_open()?;
        let pairs = self.core.solver.model_assignments()?;
        Model::from_pairs(&*self.creator, pairs)
    }

    /// Value of `formula` in the current model, completed with defaults for
    /// symbols the model leaves open.
    pub fn evaluate(&self, formula: &FormulaOf<S::Converter>) -> Result<Option<FormulaOf<S::Converter>>> {
        self.ensure_open()?;
        let term = self.creator.extract(formula)?;
        match self.core.solver.eval(&term, true)? {
            Some(value) => Ok(Some(self.creator.encapsulate(formula.formula_type(), value)?)),
            None => Ok(None),
        }
    }

    /// Enumerates the satisfying assignments of `important`. `callback` receives
    /// each assignment as a list of literals. The assertions are restored afterwards.
    pub fn all_sat<F>(&self, important: &[BoolOf<S::Converter>], mut callback: F) -> Result<usize>
    where
        F: FnMut(&[BoolOf<S::Converter>]) -> Result<()>,
    {
        self.ensure_open()?;
        self.push(1)?;
        let outcome = self.enumerate_models(important, &mut callback);
        // Restore the stack even when enumeration stopped early.
        self.pop(1)?;
        let models = outcome?;
        debug!(models, "all-sat");
        Ok(models)
    }

    fn enumerate_models<F>(&self, important: &[BoolOf<S::Converter>], callback: &mut F) -> Result<usize>
    where
        F: FnMut(&[BoolOf<S::Converter>]) -> Result<()>,
    {
        let converter = self.creator.converter();
        let bools = converter.bool_converter();
        let terms = important
            .iter()
            .map(|formula| self.creator.extract_boolean(formula))
            .collect::<Result<Vec<_>>>()?;
        let mut models = 0;
        loop {
            self.notifier.shutdown_if_necessary()?;
            if !self.check_sat()? {
                return Ok(models);
            }
            models += 1;
            let mut literals = Vec::with_capacity(terms.len());
            let mut blocking = Vec::with_capacity(terms.len());
            for (formula, term) in important.iter().zip(&terms) {
                let value = match self.core.solver.eval(term, true)? {
                    Some(value) => converter.constant_value(&value)?,
                    None => None,
                };
                let negated = bools.mk_not(term)?;
                match value {
                    Some(ConstantValue::Bool(true)) => {
                        literals.push(formula.clone());
                        blocking.push(negated);
                    }
                    Some(ConstantValue::Bool(false)) => {
                        literals.push(self.creator.encapsulate_boolean(negated)?);
                        blocking.push(term.clone());
                    }
                    _ => {
                        return Err(SolverError::Solver(format!(
                            "model has no value for {}",
                            converter.dump(term)?
                        )))
                    }
                }
            }
            callback(&literals)?;
            if blocking.is_empty() {
                return Ok(models);
            }
            self.assert_term(bools.mk_or(&blocking)?, None)?;
        }
    }

    /// Pops every level and detaches the stack. After a shutdown request the
    /// native session is discarded instead. Listeners are removed and the
    /// stack counts as closed even when popping fails.
    pub fn close(&self) -> Result<()> {
        self.ensure_open()?;
        self.core.closed.set(true);
        self.creator.unregister(&self.listener);
        self.notifier.unregister(self.interrupt_listener);
        self.last_result.set(None);
        let outcome = if self.notifier.should_shutdown() {
            warn!(
                depth = self.core.depth(),
                "shutdown requested, discarding solver without popping"
            );
            self.core.solver.shutdown()
        } else {
            self.pop_levels(self.core.depth())
        };
        let remaining = std::mem::replace(&mut *self.core.levels.borrow_mut(), vec![Level::default()]);
        for level in remaining {
            for (_, term) in level.assertions {
                self.creator.release(&term);
            }
        }
        outcome?;
        info!("assertion stack closed");
        Ok(())
    }
}

impl<S: GeneralSolver + 'static> Drop for AssertionStack<S> {
    fn drop(&mut self) {
        if !self.core.closed.get() {
            if let Err(err) = self.close() {
                warn!(%err, "failed to close assertion stack");
            }
        }
    }
}

fn is_connective(kind: TermKind) -> bool {
    matches!(
        kind,
        TermKind::Not
            | TermKind::And
            | TermKind::Or
            | TermKind::Xor
            | TermKind::Iff
            | TermKind::Implies
            | TermKind::Ite
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boolean::BooleanFormulaManager;
    use crate::dummy::{DummyContext, DummyFactory, DummySolver};
    use crate::generalized::Factory;
    use crate::numeral::NumeralFormulaManager;

    struct Fixture {
        context: Rc<DummyContext>,
        creator: Rc<FormulaCreator<DummyContext>>,
        bmgr: BooleanFormulaManager<DummyContext>,
        notifier: ShutdownNotifier,
    }

    impl Fixture {
        fn new() -> Self {
            let context = Rc::new(DummyContext::new());
            let creator = Rc::new(FormulaCreator::new(context.clone(), &Options::default()).unwrap());
            Self {
                context,
                bmgr: BooleanFormulaManager::new(creator.clone()),
                creator,
                notifier: ShutdownNotifier::new(),
            }
        }

        fn stack_with(&self, options: &Options, interpolation: bool) -> AssertionStack<DummySolver> {
            let solver = DummySolver::new(self.context.clone(), options);
            let interrupter = DummyFactory::default().new_interrupter(&solver);
            AssertionStack::new(
                self.creator.clone(),
                solver,
                interrupter,
                self.notifier.clone(),
                options,
                interpolation,
            )
            .unwrap()
        }

        fn stack(&self) -> AssertionStack<DummySolver> {
            self.stack_with(&Options::default(), false)
        }
    }

    #[test]
    fn push_and_pop_track_depth() {
        let fixture = Fixture::new();
        let stack = fixture.stack();
        assert_eq!(stack.size().unwrap(), 0);
        stack.push(3).unwrap();
        assert_eq!(stack.size().unwrap(), 3);
        stack.pop(2).unwrap();
        assert_eq!(stack.size().unwrap(), 1);
        assert!(matches!(stack.pop(2), Err(SolverError::IllegalState(_))));
        assert_eq!(stack.size().unwrap(), 1);
    }

    #[test]
    fn symbol_survives_pop() {
        let fixture = Fixture::new();
        let stack = fixture.stack();
        stack.push(1).unwrap();
        let p = fixture.bmgr.make_variable("p").unwrap();
        stack.pop(1).unwrap();
        stack.assert_formula(&p).unwrap();
    }

    #[test]
    fn added_symbol_survives_pop() {
        let fixture = Fixture::new();
        let stack = fixture.stack();
        let other = fixture.stack();
        stack.push(1).unwrap();
        // The creator already announced `q`; declaring it again is harmless.
        let term = fixture.creator.make_variable(&crate::term::FormulaType::Boolean, "q").unwrap();
        stack.add_symbol(&Symbol::Boolean(term.clone())).unwrap();
        stack.pop(1).unwrap();
        let q = fixture.creator.encapsulate_boolean(term).unwrap();
        stack.assert_formula(&q).unwrap();
        other.assert_formula(&q).unwrap();
    }

    #[test]
    fn replay_moves_symbols_to_the_level_below() {
        let fixture = Fixture::new();
        let stack = fixture.stack();
        stack.push(2).unwrap();
        let p = fixture.bmgr.make_variable("p").unwrap();
        stack.pop(1).unwrap();
        stack.assert_formula(&p).unwrap();
        stack.pop(1).unwrap();
        stack.assert_formula(&p).unwrap();
        let decl = fixture
            .context
            .app_decl(&fixture.creator.extract_boolean(&p).unwrap())
            .unwrap()
            .unwrap();
        assert!(stack.solver().is_declared(&decl));
    }

    #[test]
    fn scoped_declarations_without_replay() {
        let fixture = Fixture::new();
        let mut options = Options::default();
        options.set_global_declarations(false);
        let stack = fixture.stack_with(&options, false);
        stack.push(1).unwrap();
        let p = fixture.bmgr.make_variable("p").unwrap();
        stack.pop(1).unwrap();
        assert!(matches!(stack.assert_formula(&p), Err(SolverError::Solver(_))));
    }

    #[test]
    fn existing_symbols_are_declared_for_new_stacks() {
        let fixture = Fixture::new();
        let p = fixture.bmgr.make_variable("p").unwrap();
        let stack = fixture.stack();
        stack.assert_formula(&p).unwrap();
    }

    #[test]
    fn check_sat_reports_unknown_as_error() {
        let fixture = Fixture::new();
        let stack = fixture.stack();
        stack.assert_formula(&fixture.bmgr.make_true().unwrap()).unwrap();
        assert!(stack.check_sat().unwrap());

        stack.push(1).unwrap();
        stack.assert_formula(&fixture.bmgr.make_false().unwrap()).unwrap();
        assert!(stack.is_unsat().unwrap());
        stack.pop(1).unwrap();

        stack.assert_formula(&fixture.bmgr.make_variable("p").unwrap()).unwrap();
        let err = stack.check_sat().unwrap_err();
        assert!(matches!(err, SolverError::Solver(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn closed_stack_rejects_operations() {
        let fixture = Fixture::new();
        let stack = fixture.stack();
        assert_eq!(fixture.creator.registered_listeners(), 1);
        stack.push(2).unwrap();
        stack.close().unwrap();
        assert!(stack.is_closed());
        assert_eq!(fixture.creator.registered_listeners(), 0);
        assert!(matches!(stack.push(1), Err(SolverError::IllegalState(_))));
        assert!(matches!(stack.check_sat(), Err(SolverError::IllegalState(_))));
        assert!(matches!(stack.close(), Err(SolverError::IllegalState(_))));
        // Symbols declared after closing do not reach the stack.
        fixture.bmgr.make_variable("late").unwrap();
    }

    #[test]
    fn close_removes_the_interrupt_listener() {
        let fixture = Fixture::new();
        let before = fixture.notifier.registered_listeners();
        let stack = fixture.stack();
        assert_eq!(fixture.notifier.registered_listeners(), before + 1);
        stack.close().unwrap();
        assert_eq!(fixture.notifier.registered_listeners(), before);

        let dropped = fixture.stack();
        drop(dropped);
        assert_eq!(fixture.notifier.registered_listeners(), before);
    }

    struct FailingPop(DummySolver);

    impl GeneralSolver for FailingPop {
        type Converter = DummyContext;

        fn converter(&self) -> &Rc<DummyContext> {
            self.0.converter()
        }

        fn assert(&self, term: &Term<Self>) -> Result<()> {
            self.0.assert(term)
        }

        fn push(&self) -> Result<()> {
            self.0.push()
        }

        fn pop(&self) -> Result<()> {
            Err(SolverError::Solver("pop failed".to_string()))
        }

        fn check_sat(&self) -> Result<SolverResult> {
            self.0.check_sat()
        }

        fn reason_unknown(&self) -> Option<String> {
            self.0.reason_unknown()
        }

        fn eval(&self, term: &Term<Self>, completion: bool) -> Result<Option<Term<Self>>> {
            self.0.eval(term, completion)
        }

        fn model_assignments(&self) -> Result<Vec<(Term<Self>, Term<Self>)>> {
            self.0.model_assignments()
        }

        fn shutdown(&self) -> Result<()> {
            self.0.shutdown()
        }
    }

    #[test]
    fn failed_close_still_detaches_the_stack() {
        let fixture = Fixture::new();
        let options = Options::default();
        let solver = FailingPop(DummySolver::new(fixture.context.clone(), &options));
        let interrupter = DummyFactory::default().new_interrupter(&solver.0);
        let stack = AssertionStack::new(
            fixture.creator.clone(),
            solver,
            interrupter,
            fixture.notifier.clone(),
            &options,
            false,
        )
        .unwrap();
        stack.push(1).unwrap();

        assert!(matches!(stack.close(), Err(SolverError::Solver(_))));
        assert!(stack.is_closed());
        assert_eq!(fixture.creator.registered_listeners(), 0);
        assert_eq!(fixture.notifier.registered_listeners(), 0);
        fixture.bmgr.make_variable("late").unwrap();
        assert!(matches!(stack.close(), Err(SolverError::IllegalState(_))));
    }

    #[test]
    fn assertions_keep_a_reference_until_popped() {
        let context = Rc::new(DummyContext::with_reference_counting(true));
        let mut options = Options::default();
        options.set_track_native_references(true);
        let creator = Rc::new(FormulaCreator::new(context.clone(), &options).unwrap());
        let bmgr = BooleanFormulaManager::new(creator.clone());
        let solver = DummySolver::new(context.clone(), &options);
        let interrupter = DummyFactory::default().new_interrupter(&solver);
        let stack = AssertionStack::new(
            creator.clone(),
            solver,
            interrupter,
            ShutdownNotifier::new(),
            &options,
            false,
        )
        .unwrap();

        let p = bmgr.make_variable("p").unwrap();
        let q = bmgr.make_variable("q").unwrap();
        let base = bmgr.or(&p, &q).unwrap();
        let base_term = creator.extract_boolean(&base).unwrap();
        stack.assert_formula(&base).unwrap();
        stack.push(1).unwrap();
        let upper = bmgr.and(&p, &q).unwrap();
        let upper_term = creator.extract_boolean(&upper).unwrap();
        stack.assert_formula(&upper).unwrap();
        drop((base, upper));
        creator.clean_up_references();
        assert_eq!(context.ref_count(&base_term), 1);
        assert_eq!(context.ref_count(&upper_term), 1);

        stack.pop(1).unwrap();
        assert_eq!(context.ref_count(&upper_term), 0);
        stack.close().unwrap();
        assert_eq!(context.ref_count(&base_term), 0);
    }

    #[test]
    fn close_after_shutdown_discards_the_session() {
        let fixture = Fixture::new();
        let stack = fixture.stack();
        stack.push(2).unwrap();
        stack.assert_formula(&fixture.bmgr.make_true().unwrap()).unwrap();
        fixture.notifier.request_shutdown("test");
        assert!(matches!(stack.check_sat(), Err(SolverError::Interrupted(_))));
        stack.close().unwrap();
        assert!(stack.is_closed());
    }

    #[test]
    fn shared_subformulas_become_abbreviations() {
        let fixture = Fixture::new();
        let mut options = Options::default();
        options.min_atoms_for_abbreviation = 2;
        let stack = fixture.stack_with(&options, false);
        let bmgr = &fixture.bmgr;
        let [p, q, r, t, u] = ["p", "q", "r", "t", "u"].map(|name| bmgr.make_variable(name).unwrap());
        let shared = bmgr.and(&p, &q).unwrap();
        let formula = bmgr
            .or_all(&[
                bmgr.and(&shared, &r).unwrap(),
                bmgr.and(&shared, &t).unwrap(),
                u,
            ])
            .unwrap();
        stack.assert_formula(&formula).unwrap();
        assert_eq!(
            stack.solver().abbreviations(),
            vec![fixture.creator.extract_boolean(&shared).unwrap()]
        );

        let unshared = bmgr.and(&r, &t).unwrap();
        stack.assert_formula(&unshared).unwrap();
        assert_eq!(stack.solver().abbreviations().len(), 1);
    }

    #[test]
    fn interpolation_checks_its_preconditions() {
        let fixture = Fixture::new();
        let plain = fixture.stack();
        assert!(matches!(
            plain.get_interpolants(&[vec![0], vec![1]]),
            Err(SolverError::IllegalState(_))
        ));

        let stack = fixture.stack_with(&Options::default(), true);
        stack
            .assert_formula_in_partition(&fixture.bmgr.make_false().unwrap(), 0)
            .unwrap();
        stack
            .assert_formula_in_partition(&fixture.bmgr.make_true().unwrap(), 1)
            .unwrap();
        assert!(matches!(
            stack.get_interpolants(&[vec![0], vec![1]]),
            Err(SolverError::IllegalState(_))
        ));
        assert!(stack.is_unsat().unwrap());
        assert!(matches!(
            stack.get_interpolants(&[vec![0], vec![]]),
            Err(SolverError::InvalidArgument(_))
        ));
        assert!(matches!(
            stack.get_interpolants(&[vec![0], vec![1]]),
            Err(SolverError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn model_and_evaluation() {
        let fixture = Fixture::new();
        let imgr = NumeralFormulaManager::integer(fixture.creator.clone()).unwrap();
        let x = imgr.make_variable("x").unwrap();
        let stack = fixture.stack();
        assert!(matches!(stack.get_model(), Err(SolverError::IllegalState(_))));
        stack.assert_formula(&fixture.bmgr.make_true().unwrap()).unwrap();
        assert!(stack.check_sat().unwrap());

        let model = stack.get_model().unwrap();
        assert_eq!(model.len(), 1);
        assert_eq!(model.get("x").map(|a| a.key()), Some(&x));

        let one = imgr.make_number_from_str("1").unwrap();
        let value = stack.evaluate(&imgr.add(&x, &one).unwrap()).unwrap().unwrap();
        assert_eq!(value, one);
    }

    #[test]
    fn all_sat_restores_the_stack() {
        let fixture = Fixture::new();
        let stack = fixture.stack();
        stack.push(1).unwrap();
        stack.assert_formula(&fixture.bmgr.make_true().unwrap()).unwrap();
        let mut seen = Vec::new();
        let models = stack
            .all_sat(&[], |literals| {
                seen.push(literals.len());
                Ok(())
            })
            .unwrap();
        assert_eq!(models, 1);
        assert_eq!(seen, vec![0]);
        assert_eq!(stack.size().unwrap(), 1);
    }

    #[test]
    fn queries_are_logged_when_enabled() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
        let fixture = Fixture::new();
        let mut options = Options::default();
        options.log_all_queries = true;
        let stack = fixture.stack_with(&options, false);
        stack.assert_formula(&fixture.bmgr.make_true().unwrap()).unwrap();
        assert!(stack.check_sat().unwrap());
    }
}
