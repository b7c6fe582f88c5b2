use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::trace;

use crate::error::{Result, SolverError};
use crate::generalized::GeneralConverter;
use crate::options::Options;
use crate::term::{BooleanFormula, EnvId, Formula, FormulaType, FunctionDeclaration, Symbol};

pub type FormulaOf<C> = Formula<<C as GeneralConverter>::Term>;
pub type BoolOf<C> = BooleanFormula<<C as GeneralConverter>::Term>;
pub type DeclarationOf<C> = FunctionDeclaration<<C as GeneralConverter>::FuncDecl>;
pub type NativeSymbol<C> =
    Symbol<<C as GeneralConverter>::Term, <C as GeneralConverter>::FuncDecl>;

/// Receives every symbol declared through a creator, e.g. open assertion stacks.
pub trait SymbolListener<T, D> {
    fn symbol_declared(&self, symbol: &Symbol<T, D>) -> Result<()>;
}

pub type ListenerRef<C> =
    Weak<dyn SymbolListener<<C as GeneralConverter>::Term, <C as GeneralConverter>::FuncDecl>>;

struct ReferenceQueue<T> {
    entries: Vec<(Weak<()>, T)>,
}

impl<T> ReferenceQueue<T> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Releases every handle whose wrappers are all gone, once per registration.
    fn drain<F: Fn(&T)>(&mut self, release: F) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(liveness, term)| {
            if liveness.strong_count() == 0 {
                release(term);
                false
            } else {
                true
            }
        });
        before - self.entries.len()
    }
}

#[derive(Hash, PartialEq, Eq)]
struct FunctionSignature {
    name: String,
    argument_types: Vec<FormulaType>,
    return_type: FormulaType,
}

/// Maps native term handles of one environment to typed formula values and back.
pub struct FormulaCreator<C: GeneralConverter> {
    env: EnvId,
    converter: Rc<C>,
    bool_sort: C::Sort,
    int_sort: Option<C::Sort>,
    rational_sort: Option<C::Sort>,
    symbol_cache: RefCell<FxHashMap<(String, FormulaType), C::Term>>,
    function_cache: RefCell<FxHashMap<FunctionSignature, C::FuncDecl>>,
    declared: RefCell<Vec<NativeSymbol<C>>>,
    listeners: RefCell<Vec<ListenerRef<C>>>,
    references: Option<RefCell<ReferenceQueue<C::Term>>>,
}

impl<C: GeneralConverter> FormulaCreator<C> {
    pub fn new(converter: Rc<C>, options: &Options) -> Result<Self> {
        let bool_sort = converter.mk_bool_sort()?;
        let (int_sort, rational_sort) = match converter.try_get_numeral_converter() {
            Some(numeral) => (numeral.mk_int_sort().ok(), numeral.mk_real_sort().ok()),
            None => (None, None),
        };
        let references = (options.track_native_references
            && converter.requires_reference_counting())
        .then(|| RefCell::new(ReferenceQueue::new()));
        Ok(Self {
            env: EnvId::fresh(),
            converter,
            bool_sort,
            int_sort,
            rational_sort,
            symbol_cache: RefCell::new(FxHashMap::default()),
            function_cache: RefCell::new(FxHashMap::default()),
            declared: RefCell::new(Vec::new()),
            listeners: RefCell::new(Vec::new()),
            references,
        })
    }

    pub fn env_id(&self) -> EnvId {
        self.env
    }

    pub fn converter(&self) -> &Rc<C> {
        &self.converter
    }

    pub fn bool_sort(&self) -> &C::Sort {
        &self.bool_sort
    }

    pub fn int_sort(&self) -> Result<&C::Sort> {
        self.int_sort
            .as_ref()
            .ok_or_else(|| SolverError::UnsupportedTheory("integer arithmetic".to_string()))
    }

    pub fn rational_sort(&self) -> Result<&C::Sort> {
        self.rational_sort
            .as_ref()
            .ok_or_else(|| SolverError::UnsupportedTheory("rational arithmetic".to_string()))
    }

    pub fn sort_of(&self, formula_type: &FormulaType) -> Result<C::Sort> {
        match formula_type {
            FormulaType::Boolean => Ok(self.bool_sort.clone()),
            FormulaType::Integer => self.int_sort().cloned(),
            FormulaType::Rational => self.rational_sort().cloned(),
            other => self.converter.type_to_sort(other),
        }
    }

    pub fn get_type(&self, term: &C::Term) -> Result<FormulaType> {
        let sort = self.converter.get_sort(term)?;
        self.converter.sort_to_type(&sort)
    }

    pub fn encapsulate(
        &self,
        formula_type: &FormulaType,
        term: C::Term,
    ) -> Result<Formula<C::Term>> {
        let actual = self.get_type(&term)?;
        if !formula_type.accepts(&actual) {
            return Err(SolverError::type_mismatch(formula_type, &actual));
        }
        let liveness = match &self.references {
            Some(queue) => {
                let mut queue = queue.borrow_mut();
                let released = queue.drain(|term| self.converter.dec_ref(term));
                if released > 0 {
                    trace!(released, "released native references");
                }
                self.converter.inc_ref(&term);
                let liveness = Rc::new(());
                queue.entries.push((Rc::downgrade(&liveness), term.clone()));
                Some(liveness)
            }
            None => None,
        };
        Ok(Formula::new(term, formula_type.clone(), self.env, liveness))
    }

    pub fn encapsulate_boolean(&self, term: C::Term) -> Result<BooleanFormula<C::Term>> {
        BooleanFormula::try_from(self.encapsulate(&FormulaType::Boolean, term)?)
    }

    /// Wraps a handle with the type of its own sort.
    pub fn encapsulate_with_type_of(&self, term: C::Term) -> Result<Formula<C::Term>> {
        let formula_type = self.get_type(&term)?;
        self.encapsulate(&formula_type, term)
    }

    pub fn extract(&self, formula: &Formula<C::Term>) -> Result<C::Term> {
        if formula.owner() != self.env {
            return Err(SolverError::ForeignValue);
        }
        Ok(formula.term().clone())
    }

    pub fn extract_boolean(&self, formula: &BooleanFormula<C::Term>) -> Result<C::Term> {
        self.extract(formula.as_formula())
    }

    pub fn extract_all(&self, formulas: &[Formula<C::Term>]) -> Result<Vec<C::Term>> {
        formulas.iter().map(|f| self.extract(f)).collect()
    }

    pub fn make_variable(&self, formula_type: &FormulaType, name: &str) -> Result<C::Term> {
        let key = (name.to_string(), formula_type.clone());
        if let Some(term) = self.symbol_cache.borrow().get(&key) {
            return Ok(term.clone());
        }
        let sort = self.sort_of(formula_type)?;
        let term = self.converter.mk_smt_symbol(name, &sort)?;
        self.hold(&term);
        self.symbol_cache.borrow_mut().insert(key, term.clone());
        let symbol = if formula_type.is_boolean() {
            Symbol::Boolean(term.clone())
        } else {
            Symbol::Numeric(term.clone())
        };
        self.publish(symbol)?;
        Ok(term)
    }

    pub fn declare_function(
        &self,
        name: &str,
        argument_types: &[FormulaType],
        return_type: &FormulaType,
    ) -> Result<FunctionDeclaration<C::FuncDecl>> {
        if argument_types.is_empty() {
            return Err(SolverError::InvalidArgument(format!(
                "function {} needs at least one argument, use a variable instead",
                name
            )));
        }
        let key = FunctionSignature {
            name: name.to_string(),
            argument_types: argument_types.to_vec(),
            return_type: return_type.clone(),
        };
        let cached = self.function_cache.borrow().get(&key).cloned();
        let decl = match cached {
            Some(decl) => decl,
            None => {
                let domain = argument_types
                    .iter()
                    .map(|ty| self.sort_of(ty))
                    .collect::<Result<Vec<_>>>()?;
                let range = self.sort_of(return_type)?;
                let decl = self.converter.mk_func_decl(name, &domain, &range)?;
                self.function_cache.borrow_mut().insert(key, decl.clone());
                self.publish(Symbol::Function(decl.clone()))?;
                decl
            }
        };
        Ok(FunctionDeclaration::new(
            name,
            argument_types.to_vec(),
            return_type.clone(),
            decl,
            self.env,
        ))
    }

    /// Every symbol declared so far, in declaration order.
    pub fn declared_symbols(&self) -> Vec<NativeSymbol<C>> {
        self.declared.borrow().clone()
    }

    pub fn register(&self, listener: ListenerRef<C>) {
        self.listeners.borrow_mut().push(listener);
    }

    pub fn unregister(&self, listener: &ListenerRef<C>) {
        self.listeners
            .borrow_mut()
            .retain(|registered| registered.strong_count() > 0 && !registered.ptr_eq(listener));
    }

    pub fn registered_listeners(&self) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|listener| listener.strong_count() > 0)
            .count()
    }

    fn publish(&self, symbol: NativeSymbol<C>) -> Result<()> {
        self.declared.borrow_mut().push(symbol.clone());
        let listeners: Vec<_> = {
            let mut registered = self.listeners.borrow_mut();
            registered.retain(|listener| listener.strong_count() > 0);
            registered.iter().filter_map(|listener| listener.upgrade()).collect()
        };
        for listener in listeners {
            listener.symbol_declared(&symbol)?;
        }
        Ok(())
    }

    /// Releases the native references of all formulas that became unreachable.
    pub fn clean_up_references(&self) -> usize {
        match &self.references {
            Some(queue) => queue
                .borrow_mut()
                .drain(|term| self.converter.dec_ref(term)),
            None => 0,
        }
    }

    /// Takes a native reference for a handle kept outside formula wrappers.
    /// Does nothing unless native references are tracked.
    pub fn hold(&self, term: &C::Term) {
        if self.references.is_some() {
            self.converter.inc_ref(term);
        }
    }

    /// Gives back a reference taken with [`FormulaCreator::hold`].
    pub fn release(&self, term: &C::Term) {
        if self.references.is_some() {
            self.converter.dec_ref(term);
        }
    }

    pub fn tracked_references(&self) -> usize {
        self.references
            .as_ref()
            .map_or(0, |queue| queue.borrow().entries.len())
    }
}

impl<C: GeneralConverter> Drop for FormulaCreator<C> {
    fn drop(&mut self) {
        if let Some(queue) = &self.references {
            for (_, term) in queue.borrow_mut().entries.drain(..) {
                self.converter.dec_ref(&term);
            }
            for term in self.symbol_cache.borrow().values() {
                self.converter.dec_ref(term);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyContext, DummyDecl, DummyTerm};
    use std::cell::Cell;

    fn creator(track: bool) -> FormulaCreator<DummyContext> {
        let mut options = Options::default();
        options.set_track_native_references(track);
        let context = Rc::new(DummyContext::with_reference_counting(true));
        FormulaCreator::new(context, &options).unwrap()
    }

    #[test]
    fn encapsulate_checks_sort() {
        let creator = creator(false);
        let x = creator.make_variable(&FormulaType::Integer, "x").unwrap();
        assert!(creator.encapsulate(&FormulaType::Integer, x.clone()).is_ok());
        assert!(matches!(
            creator.encapsulate(&FormulaType::Boolean, x.clone()),
            Err(SolverError::TypeMismatch { .. })
        ));
        let widened = creator.encapsulate(&FormulaType::Rational, x).unwrap();
        assert_eq!(widened.formula_type(), &FormulaType::Rational);

        let r = creator.make_variable(&FormulaType::Rational, "r").unwrap();
        assert!(matches!(
            creator.encapsulate(&FormulaType::Integer, r),
            Err(SolverError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn extract_rejects_foreign_values() {
        let first = creator(false);
        let second = creator(false);
        let p = first.make_variable(&FormulaType::Boolean, "p").unwrap();
        let formula = first.encapsulate_boolean(p.clone()).unwrap();
        assert_eq!(first.extract_boolean(&formula).unwrap(), p);
        assert!(matches!(
            second.extract_boolean(&formula),
            Err(SolverError::ForeignValue)
        ));
    }

    #[test]
    fn make_variable_is_deterministic() {
        let creator = creator(false);
        let a = creator.make_variable(&FormulaType::Bitvector(8), "a").unwrap();
        let b = creator.make_variable(&FormulaType::Bitvector(8), "a").unwrap();
        assert_eq!(a, b);
        assert_eq!(creator.declared_symbols().len(), 1);
        assert_eq!(creator.get_type(&a).unwrap(), FormulaType::Bitvector(8));
    }

    #[test]
    fn floating_point_is_not_modelled() {
        let creator = creator(false);
        let fp = FormulaType::FloatingPoint {
            exponent: 8,
            mantissa: 24,
        };
        assert!(matches!(
            creator.make_variable(&fp, "f"),
            Err(SolverError::UnsupportedTheory(_))
        ));
    }

    #[test]
    fn cleanup_queue_is_disabled_by_default() {
        let creator = creator(false);
        let p = creator.make_variable(&FormulaType::Boolean, "p").unwrap();
        let formula = creator.encapsulate_boolean(p.clone()).unwrap();
        assert!(!formula.as_formula().is_tracked());
        assert_eq!(creator.tracked_references(), 0);
        assert_eq!(creator.converter().ref_count(&p), 0);
    }

    #[test]
    fn cleanup_queue_releases_each_registration_once() {
        let creator = creator(true);
        let p = creator.make_variable(&FormulaType::Boolean, "p").unwrap();
        // One reference belongs to the symbol cache.
        assert_eq!(creator.converter().ref_count(&p), 1);

        let first = creator.encapsulate_boolean(p.clone()).unwrap();
        let second = creator.encapsulate_boolean(p.clone()).unwrap();
        let alias = first.clone();
        assert_eq!(creator.converter().ref_count(&p), 3);

        drop(first);
        // Still reachable through the clone.
        assert_eq!(creator.clean_up_references(), 0);
        assert_eq!(creator.converter().ref_count(&p), 3);

        drop(alias);
        assert_eq!(creator.clean_up_references(), 1);
        assert_eq!(creator.converter().ref_count(&p), 2);
        assert_eq!(creator.clean_up_references(), 0);

        drop(second);
        let q = creator.make_variable(&FormulaType::Boolean, "q").unwrap();
        // Draining happens before each encapsulation.
        let _q = creator.encapsulate_boolean(q).unwrap();
        assert_eq!(creator.converter().ref_count(&p), 1);
        assert_eq!(creator.tracked_references(), 1);
    }

    #[test]
    fn dropping_the_creator_returns_every_reference() {
        let context = Rc::new(DummyContext::with_reference_counting(true));
        let mut options = Options::default();
        options.set_track_native_references(true);
        let creator = FormulaCreator::new(context.clone(), &options).unwrap();
        let p = creator.make_variable(&FormulaType::Boolean, "p").unwrap();
        let x = creator.make_variable(&FormulaType::Integer, "x").unwrap();
        let formula = creator.encapsulate_boolean(p.clone()).unwrap();
        creator.hold(&x);
        assert_eq!(context.ref_count(&p), 2);
        assert_eq!(context.ref_count(&x), 2);
        creator.release(&x);

        drop(creator);
        assert_eq!(context.ref_count(&p), 0);
        assert_eq!(context.ref_count(&x), 0);
        drop(formula);
    }

    struct Recorder {
        seen: Cell<usize>,
    }

    impl<T, D> SymbolListener<T, D> for Recorder {
        fn symbol_declared(&self, _symbol: &Symbol<T, D>) -> Result<()> {
            self.seen.set(self.seen.get() + 1);
            Ok(())
        }
    }

    #[test]
    fn listeners_see_new_symbols_only() {
        let creator = creator(false);
        let recorder = Rc::new(Recorder { seen: Cell::new(0) });
        let as_listener: Rc<dyn SymbolListener<DummyTerm, DummyDecl>> = recorder.clone();
        let weak = Rc::downgrade(&as_listener);
        creator.register(weak.clone());

        creator.make_variable(&FormulaType::Boolean, "p").unwrap();
        creator.make_variable(&FormulaType::Boolean, "p").unwrap();
        let f1 = creator
            .declare_function("f", &[FormulaType::Integer], &FormulaType::Integer)
            .unwrap();
        let f2 = creator
            .declare_function("f", &[FormulaType::Integer], &FormulaType::Integer)
            .unwrap();
        assert_eq!(f1, f2);
        assert_eq!(recorder.seen.get(), 2);

        creator.unregister(&weak);
        creator.make_variable(&FormulaType::Integer, "x").unwrap();
        assert_eq!(recorder.seen.get(), 2);
        assert_eq!(creator.registered_listeners(), 0);
    }
}
