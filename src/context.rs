use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info};

use crate::array::ArrayFormulaManager;
use crate::bitvector::BitvectorFormulaManager;
use crate::boolean::BooleanFormulaManager;
use crate::converters::{self, Converter};
use crate::creator::{BoolOf, FormulaCreator, FormulaOf};
use crate::error::{Result, SolverError};
use crate::generalized::{Factory, GeneralConverter};
use crate::numeral::NumeralFormulaManager;
use crate::options::Options;
use crate::quantifier::QuantifiedFormulaManager;
use crate::shutdown::{ShutdownNotifier, Watchdog};
use crate::stack::AssertionStack;
use crate::uf::UfManager;
use crate::visitor;

/// One solver environment: a native context, the creator that wraps its
/// terms, the theory managers and the stacks opened on it.
pub struct SolverContext<F: Factory> {
    factory: RefCell<F>,
    context: Rc<F::Converter>,
    creator: Rc<FormulaCreator<F::Converter>>,
    options: Options,
    notifier: ShutdownNotifier,
}

impl<F: Factory> SolverContext<F> {
    pub fn new(factory: F, options: Options) -> Result<Self> {
        Self::with_notifier(factory, options, ShutdownNotifier::new())
    }

    /// A context that stops its solvers once `notifier` requests a shutdown.
    pub fn with_notifier(mut factory: F, options: Options, notifier: ShutdownNotifier) -> Result<Self> {
        let context = factory.new_context(&options)?;
        let creator = Rc::new(FormulaCreator::new(context.clone(), &options)?);
        info!(solver = ?options.solver, env = ?creator.env_id(), "solver context created");
        Ok(Self {
            factory: RefCell::new(factory),
            context,
            creator,
            options,
            notifier,
        })
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn creator(&self) -> &Rc<FormulaCreator<F::Converter>> {
        &self.creator
    }

    pub fn shutdown_notifier(&self) -> &ShutdownNotifier {
        &self.notifier
    }

    /// Cancels running and future checks after `timeout`, unless the watchdog is dropped first.
    pub fn request_shutdown_after(&self, timeout: Duration) -> Watchdog {
        self.notifier.request_shutdown_after(timeout)
    }

    pub fn boolean_manager(&self) -> BooleanFormulaManager<F::Converter> {
        BooleanFormulaManager::new(self.creator.clone())
    }

    pub fn integer_manager(&self) -> Result<NumeralFormulaManager<F::Converter>> {
        NumeralFormulaManager::integer(self.creator.clone())
    }

    pub fn rational_manager(&self) -> Result<NumeralFormulaManager<F::Converter>> {
        NumeralFormulaManager::rational(self.creator.clone())
    }

    pub fn uf_manager(&self) -> UfManager<F::Converter> {
        UfManager::new(self.creator.clone())
    }

    pub fn quantifier_manager(&self) -> Result<QuantifiedFormulaManager<F::Converter>> {
        self.require(self.context.try_get_quantifier_converter().is_some(), "quantifiers")?;
        Ok(QuantifiedFormulaManager::new(self.creator.clone()))
    }

    pub fn array_manager(&self) -> Result<ArrayFormulaManager<F::Converter>> {
        self.require(self.context.try_get_array_converter().is_some(), "arrays")?;
        Ok(ArrayFormulaManager::new(self.creator.clone()))
    }

    pub fn bitvector_manager(&self) -> Result<BitvectorFormulaManager<F::Converter>> {
        self.require(self.context.try_get_bv_converter().is_some(), "bit-vectors")?;
        Ok(BitvectorFormulaManager::new(self.creator.clone()))
    }

    fn require(&self, supported: bool, theory: &str) -> Result<()> {
        if supported {
            Ok(())
        } else {
            Err(SolverError::UnsupportedTheory(theory.to_string()))
        }
    }

    /// Opens a fresh assertion stack sharing this context's symbols.
    pub fn new_stack(&self, use_for_interpolation: bool) -> Result<AssertionStack<F::Solver>> {
        self.notifier.shutdown_if_necessary()?;
        let solver = self
            .factory
            .borrow_mut()
            .new_solver(&self.context, &self.options)?;
        let interrupter = self.factory.borrow().new_interrupter(&solver);
        AssertionStack::new(
            self.creator.clone(),
            solver,
            interrupter,
            self.notifier.clone(),
            &self.options,
            use_for_interpolation,
        )
    }

    /// Parses one SMT-LIB formula. It may refer to every symbol declared so far.
    pub fn parse(&self, text: &str) -> Result<BoolOf<F::Converter>> {
        let term = self
            .context
            .parse(text, &self.creator.declared_symbols())?;
        debug!(text, "parsed formula");
        self.creator.encapsulate_boolean(term)
    }

    pub fn dump(&self, formula: &FormulaOf<F::Converter>) -> Result<String> {
        self.context.dump(&self.creator.extract(formula)?)
    }

    pub fn extract_variables(
        &self,
        formula: &FormulaOf<F::Converter>,
    ) -> Result<BTreeMap<String, FormulaOf<F::Converter>>> {
        visitor::extract_variables(&*self.creator, formula)
    }

    pub fn extract_variables_and_ufs(
        &self,
        formula: &FormulaOf<F::Converter>,
    ) -> Result<BTreeMap<String, FormulaOf<F::Converter>>> {
        visitor::extract_variables_and_ufs(&*self.creator, formula)
    }
}

impl<F: Factory> Drop for SolverContext<F> {
    fn drop(&mut self) {
        self.factory.get_mut().delete_context(self.context.clone());
        info!(env = ?self.creator.env_id(), "solver context closed");
    }
}

/// Code that runs against whichever backend the options select.
pub trait ContextVisitor {
    type Output;

    fn visit<F: Factory>(self, context: &SolverContext<F>) -> Result<Self::Output>;
}

/// Creates the context `options.solver` names and hands it to `visitor`.
pub fn with_solver_context<V: ContextVisitor>(options: &Options, visitor: V) -> Result<V::Output> {
    match options.solver {
        Converter::Dummy => {
            let context = SolverContext::new(converters::mk_dummy_factory(), options.clone())?;
            visitor.visit(&context)
        }
        #[cfg(feature = "z3")]
        Converter::Z3 => {
            let context = SolverContext::new(converters::mk_z3_factory(), options.clone())?;
            visitor.visit(&context)
        }
        #[cfg(not(feature = "z3"))]
        Converter::Z3 => Err(SolverError::Config(
            "this build does not include the z3 backend".to_string(),
        )),
    }
}
