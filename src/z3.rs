use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed};
use polysmt_z3_sys as sys;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::ptr;
use std::rc::Rc;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

use crate::error::{Result, SolverError};
use crate::generalized::{
    ConstantValue, Factory, GeneralArrayConverter, GeneralBoolConverter, GeneralBvConverter,
    GeneralConverter, GeneralDecl, GeneralNumeralConverter, GeneralQuantifierConverter,
    GeneralSolver, GeneralSort, GeneralTerm, Interrupter, Quantifier, SolverResult, TermKind,
};
use crate::options::Options;
use crate::term::{FormulaType, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Z3Sort(sys::Z3_sort);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Z3Term(sys::Z3_ast);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Z3Decl(sys::Z3_func_decl);

impl GeneralSort for Z3Sort {}

impl GeneralTerm for Z3Term {}

impl GeneralDecl for Z3Decl {}

struct RawContext(sys::Z3_context);

// Z3_interrupt may be called from any thread.
unsafe impl Send for RawContext {}

/// Shared with interrupters. Cleared before the native context is deleted.
struct InterruptHandle {
    context: Mutex<Option<RawContext>>,
}

/// One native reference held by the context for an AST it handed out.
#[derive(Default)]
struct Pin {
    // References taken through `inc_ref` and not yet given back.
    owners: usize,
    permanent: bool,
}

/// A Z3 context in reference-counting mode.
///
/// The context holds a single native reference for every AST it hands out.
/// Sorts and declarations keep theirs until the context is dropped. A term's
/// reference is given back once `inc_ref` claimed it and every claim was
/// returned through `dec_ref`; unclaimed terms stay alive with the context.
pub struct Z3Context {
    context: sys::Z3_context,
    pinned: RefCell<FxHashMap<sys::Z3_ast, Pin>>,
    interrupt: Arc<InterruptHandle>,
}

fn cstring(text: &str) -> Result<CString> {
    CString::new(text)
        .map_err(|_| SolverError::InvalidArgument(format!("{:?} contains a NUL byte", text)))
}

impl Z3Context {
    pub fn new() -> Result<Self> {
        let model = cstring("model")?;
        let enabled = cstring("true")?;
        let context = unsafe {
            let cfg = sys::Z3_mk_config();
            sys::Z3_set_param_value(cfg, model.as_ptr(), enabled.as_ptr());
            let ctx = sys::Z3_mk_context_rc(cfg);
            sys::Z3_del_config(cfg);
            ctx
        };
        if context.is_null() {
            return Err(SolverError::Solver("cannot create a Z3 context".to_string()));
        }
        unsafe { sys::Z3_set_error_handler(context, None) };
        Ok(Self {
            context,
            pinned: RefCell::new(FxHashMap::default()),
            interrupt: Arc::new(InterruptHandle {
                context: Mutex::new(Some(RawContext(context))),
            }),
        })
    }

    fn check_error(&self) -> Result<()> {
        let code = unsafe { sys::Z3_get_error_code(self.context) };
        if code == sys::Z3_OK {
            return Ok(());
        }
        let message = self.string(unsafe { sys::Z3_get_error_msg(self.context, code) });
        Err(match code {
            sys::Z3_SORT_ERROR | sys::Z3_IOB | sys::Z3_INVALID_ARG | sys::Z3_PARSER_ERROR => {
                SolverError::InvalidArgument(message)
            }
            // Operator applications report ill-sorted arguments as a generic exception.
            sys::Z3_EXCEPTION if message.to_lowercase().contains("sort mismatch") => {
                SolverError::InvalidArgument(message)
            }
            _ => SolverError::Solver(message),
        })
    }

    fn type_of(&self, term: &Z3Term) -> Result<FormulaType> {
        self.sort_to_type(&self.get_sort(term)?)
    }

    fn boolean_operands(&self, terms: &[Z3Term]) -> Result<()> {
        for term in terms {
            let actual = self.type_of(term)?;
            if actual != FormulaType::Boolean {
                return Err(SolverError::type_mismatch(&FormulaType::Boolean, &actual));
            }
        }
        Ok(())
    }

    fn same_sort_operands(&self, terms: &[Z3Term]) -> Result<()> {
        let Some((first, rest)) = terms.split_first() else {
            return Ok(());
        };
        let expected = self.type_of(first)?;
        for term in rest {
            let actual = self.type_of(term)?;
            if actual != expected {
                return Err(SolverError::type_mismatch(&expected, &actual));
            }
        }
        Ok(())
    }

    fn string(&self, text: sys::Z3_string) -> String {
        if text.is_null() {
            return String::new();
        }
        unsafe { CStr::from_ptr(text) }.to_string_lossy().into_owned()
    }

    fn pin(&self, ast: sys::Z3_ast) {
        self.pinned.borrow_mut().entry(ast).or_insert_with(|| {
            unsafe { sys::Z3_inc_ref(self.context, ast) };
            Pin::default()
        });
    }

    fn pin_permanently(&self, ast: sys::Z3_ast) {
        self.pin(ast);
        if let Some(pin) = self.pinned.borrow_mut().get_mut(&ast) {
            pin.permanent = true;
        }
    }

    /// Number of ASTs the context currently holds a reference for.
    pub fn pinned_asts(&self) -> usize {
        self.pinned.borrow().len()
    }

    fn term(&self, ast: sys::Z3_ast) -> Result<Z3Term> {
        self.check_error()?;
        if ast.is_null() {
            return Err(SolverError::Solver("Z3 returned no term".to_string()));
        }
        self.pin(ast);
        Ok(Z3Term(ast))
    }

    fn sort(&self, sort: sys::Z3_sort) -> Result<Z3Sort> {
        self.check_error()?;
        if sort.is_null() {
            return Err(SolverError::Solver("Z3 returned no sort".to_string()));
        }
        self.pin_permanently(unsafe { sys::Z3_sort_to_ast(self.context, sort) });
        Ok(Z3Sort(sort))
    }

    fn decl(&self, decl: sys::Z3_func_decl) -> Result<Z3Decl> {
        self.check_error()?;
        if decl.is_null() {
            return Err(SolverError::Solver("Z3 returned no declaration".to_string()));
        }
        self.pin_permanently(unsafe { sys::Z3_func_decl_to_ast(self.context, decl) });
        Ok(Z3Decl(decl))
    }

    fn symbol(&self, name: &str) -> Result<sys::Z3_symbol> {
        let name = cstring(name)?;
        let symbol = unsafe { sys::Z3_mk_string_symbol(self.context, name.as_ptr()) };
        self.check_error()?;
        Ok(symbol)
    }

    fn symbol_text(&self, symbol: sys::Z3_symbol) -> String {
        unsafe {
            if sys::Z3_get_symbol_kind(self.context, symbol) == sys::Z3_STRING_SYMBOL {
                self.string(sys::Z3_get_symbol_string(self.context, symbol))
            } else {
                sys::Z3_get_symbol_int(self.context, symbol).to_string()
            }
        }
    }

    fn app(&self, term: &Z3Term) -> Option<sys::Z3_app> {
        unsafe {
            if sys::Z3_is_app(self.context, term.0) {
                Some(sys::Z3_to_app(self.context, term.0))
            } else {
                None
            }
        }
    }

    fn decl_kind(&self, app: sys::Z3_app) -> sys::Z3_decl_kind {
        unsafe { sys::Z3_get_decl_kind(self.context, sys::Z3_get_app_decl(self.context, app)) }
    }

    fn conjunction(&self, terms: &[Z3Term]) -> Result<Z3Term> {
        match terms {
            [] => self.mk_smt_bool(true),
            [single] => Ok(*single),
            _ => self.mk_and(terms),
        }
    }

    /// Runs tactic `name` on `formula` and returns the disjunction of the subgoals.
    fn apply_tactic(&self, name: &str, formula: &Z3Term) -> Result<Z3Term> {
        let name = cstring(name)?;
        let goal = unsafe { sys::Z3_mk_goal(self.context, false, false, false) };
        self.check_error()?;
        unsafe {
            sys::Z3_goal_inc_ref(self.context, goal);
            sys::Z3_goal_assert(self.context, goal, formula.0);
        }
        let result = self.check_error().and_then(|_| {
            let tactic = unsafe { sys::Z3_mk_tactic(self.context, name.as_ptr()) };
            self.check_error()?;
            unsafe { sys::Z3_tactic_inc_ref(self.context, tactic) };
            let result = self.run_tactic(tactic, goal);
            unsafe { sys::Z3_tactic_dec_ref(self.context, tactic) };
            result
        });
        unsafe { sys::Z3_goal_dec_ref(self.context, goal) };
        result
    }

    fn run_tactic(&self, tactic: sys::Z3_tactic, goal: sys::Z3_goal) -> Result<Z3Term> {
        let applied = unsafe { sys::Z3_tactic_apply(self.context, tactic, goal) };
        self.check_error()?;
        unsafe { sys::Z3_apply_result_inc_ref(self.context, applied) };
        let result = (|| {
            let subgoals = unsafe { sys::Z3_apply_result_get_num_subgoals(self.context, applied) };
            let mut disjuncts = Vec::with_capacity(subgoals as usize);
            for i in 0..subgoals {
                let subgoal = unsafe { sys::Z3_apply_result_get_subgoal(self.context, applied, i) };
                let size = unsafe { sys::Z3_goal_size(self.context, subgoal) };
                let mut conjuncts = Vec::with_capacity(size as usize);
                for j in 0..size {
                    conjuncts.push(self.term(unsafe { sys::Z3_goal_formula(self.context, subgoal, j) })?);
                }
                disjuncts.push(self.conjunction(&conjuncts)?);
            }
            match disjuncts.as_slice() {
                [] => self.mk_smt_bool(false),
                [single] => Ok(*single),
                _ => self.mk_or(&disjuncts),
            }
        })();
        unsafe { sys::Z3_apply_result_dec_ref(self.context, applied) };
        result
    }

    /// Uninterpreted constants and functions occurring in `terms`.
    fn uninterpreted_symbols(&self, terms: &[Z3Term]) -> Result<FxHashSet<Z3Decl>> {
        let mut seen = FxHashSet::default();
        let mut found = FxHashSet::default();
        let mut pending = terms.to_vec();
        while let Some(term) = pending.pop() {
            if !seen.insert(term) {
                continue;
            }
            if let Some(decl) = self.app_decl(&term)? {
                found.insert(decl);
            }
            pending.extend(self.children(&term)?);
        }
        Ok(found)
    }
}

impl Drop for Z3Context {
    fn drop(&mut self) {
        // Interrupters may still be registered with a shutdown notifier.
        if let Ok(mut slot) = self.interrupt.context.lock() {
            slot.take();
        }
        unsafe { sys::Z3_del_context(self.context) };
    }
}

fn raw(terms: &[Z3Term]) -> Vec<sys::Z3_ast> {
    terms.iter().map(|term| term.0).collect()
}

macro_rules! create_converter_unary_function_z3 {
    ($func_name:ident, $z3_sys_func_name:ident) => {
        fn $func_name(&self, term: &Z3Term) -> Result<Z3Term> {
            self.term(unsafe { sys::$z3_sys_func_name(self.context, term.0) })
        }
    };
    ($func_name:ident, $z3_sys_func_name:ident, $check:ident) => {
        fn $func_name(&self, term: &Z3Term) -> Result<Z3Term> {
            self.$check(&[*term])?;
            self.term(unsafe { sys::$z3_sys_func_name(self.context, term.0) })
        }
    };
}

macro_rules! create_converter_binary_function_z3 {
    ($func_name:ident, $z3_sys_func_name:ident) => {
        fn $func_name(&self, term1: &Z3Term, term2: &Z3Term) -> Result<Z3Term> {
            self.term(unsafe { sys::$z3_sys_func_name(self.context, term1.0, term2.0) })
        }
    };
    ($func_name:ident, $z3_sys_func_name:ident, $check:ident) => {
        fn $func_name(&self, term1: &Z3Term, term2: &Z3Term) -> Result<Z3Term> {
            self.$check(&[*term1, *term2])?;
            self.term(unsafe { sys::$z3_sys_func_name(self.context, term1.0, term2.0) })
        }
    };
}

macro_rules! create_converter_vector_function_z3 {
    ($func_name:ident, $z3_sys_func_name:ident) => {
        fn $func_name(&self, terms: &[Z3Term]) -> Result<Z3Term> {
            let args = raw(terms);
            self.term(unsafe {
                sys::$z3_sys_func_name(self.context, args.len() as u32, args.as_ptr())
            })
        }
    };
    ($func_name:ident, $z3_sys_func_name:ident, $check:ident) => {
        fn $func_name(&self, terms: &[Z3Term]) -> Result<Z3Term> {
            self.$check(terms)?;
            let args = raw(terms);
            self.term(unsafe {
                sys::$z3_sys_func_name(self.context, args.len() as u32, args.as_ptr())
            })
        }
    };
}

macro_rules! create_converter_pair_function_z3 {
    ($func_name:ident, $z3_sys_func_name:ident) => {
        fn $func_name(&self, term1: &Z3Term, term2: &Z3Term) -> Result<Z3Term> {
            let args = [term1.0, term2.0];
            self.term(unsafe { sys::$z3_sys_func_name(self.context, 2, args.as_ptr()) })
        }
    };
}

impl GeneralConverter for Z3Context {
    type Sort = Z3Sort;
    type Term = Z3Term;
    type FuncDecl = Z3Decl;

    fn mk_bool_sort(&self) -> Result<Z3Sort> {
        self.sort(unsafe { sys::Z3_mk_bool_sort(self.context) })
    }

    fn mk_smt_symbol(&self, name: &str, sort: &Z3Sort) -> Result<Z3Term> {
        let symbol = self.symbol(name)?;
        self.term(unsafe { sys::Z3_mk_const(self.context, symbol, sort.0) })
    }

    fn get_sort(&self, term: &Z3Term) -> Result<Z3Sort> {
        self.sort(unsafe { sys::Z3_get_sort(self.context, term.0) })
    }

    fn sort_to_type(&self, sort: &Z3Sort) -> Result<FormulaType> {
        let kind = unsafe { sys::Z3_get_sort_kind(self.context, sort.0) };
        match kind {
            sys::Z3_BOOL_SORT => Ok(FormulaType::Boolean),
            sys::Z3_INT_SORT => Ok(FormulaType::Integer),
            sys::Z3_REAL_SORT => Ok(FormulaType::Rational),
            sys::Z3_BV_SORT => Ok(FormulaType::Bitvector(unsafe {
                sys::Z3_get_bv_sort_size(self.context, sort.0)
            })),
            sys::Z3_ARRAY_SORT => {
                let index = self.sort(unsafe { sys::Z3_get_array_sort_domain(self.context, sort.0) })?;
                let element = self.sort(unsafe { sys::Z3_get_array_sort_range(self.context, sort.0) })?;
                Ok(FormulaType::array(
                    self.sort_to_type(&index)?,
                    self.sort_to_type(&element)?,
                ))
            }
            sys::Z3_FLOATING_POINT_SORT => {
                Err(SolverError::UnsupportedTheory("floating point".to_string()))
            }
            other => Err(SolverError::UnsupportedTheory(format!("Z3 sort kind {}", other))),
        }
    }

    fn type_to_sort(&self, formula_type: &FormulaType) -> Result<Z3Sort> {
        match formula_type {
            FormulaType::Boolean => self.mk_bool_sort(),
            FormulaType::Integer => self.mk_int_sort(),
            FormulaType::Rational => self.mk_real_sort(),
            FormulaType::Bitvector(width) => self.mk_bv_sort(*width),
            FormulaType::Array(index, element) => {
                let index = self.type_to_sort(index)?;
                let element = self.type_to_sort(element)?;
                self.mk_array_sort(&index, &element)
            }
            FormulaType::FloatingPoint { .. } => {
                Err(SolverError::UnsupportedTheory("floating point".to_string()))
            }
        }
    }

    fn term_kind(&self, term: &Z3Term) -> Result<TermKind> {
        let kind = unsafe { sys::Z3_get_ast_kind(self.context, term.0) };
        Ok(match kind {
            sys::Z3_NUMERAL_AST => TermKind::Value,
            sys::Z3_VAR_AST => {
                TermKind::BoundVariable(unsafe { sys::Z3_get_index_value(self.context, term.0) })
            }
            sys::Z3_QUANTIFIER_AST => {
                if unsafe { sys::Z3_is_quantifier_forall(self.context, term.0) } {
                    TermKind::Quantifier(Quantifier::Forall)
                } else {
                    TermKind::Quantifier(Quantifier::Exists)
                }
            }
            sys::Z3_APP_AST => {
                let app = unsafe { sys::Z3_to_app(self.context, term.0) };
                match self.decl_kind(app) {
                    sys::Z3_OP_TRUE => TermKind::True,
                    sys::Z3_OP_FALSE => TermKind::False,
                    sys::Z3_OP_NOT => TermKind::Not,
                    sys::Z3_OP_AND => TermKind::And,
                    sys::Z3_OP_OR => TermKind::Or,
                    sys::Z3_OP_XOR => TermKind::Xor,
                    sys::Z3_OP_IFF => TermKind::Iff,
                    sys::Z3_OP_IMPLIES => TermKind::Implies,
                    sys::Z3_OP_ITE => TermKind::Ite,
                    sys::Z3_OP_EQ => TermKind::Eq,
                    sys::Z3_OP_DISTINCT => TermKind::Distinct,
                    sys::Z3_OP_ANUM | sys::Z3_OP_AGNUM | sys::Z3_OP_BNUM => TermKind::Value,
                    sys::Z3_OP_UNINTERPRETED => {
                        if unsafe { sys::Z3_get_app_num_args(self.context, app) } == 0 {
                            TermKind::Variable
                        } else {
                            TermKind::Uf
                        }
                    }
                    _ => TermKind::Interpreted,
                }
            }
            _ => TermKind::Unknown,
        })
    }

    fn children(&self, term: &Z3Term) -> Result<Vec<Z3Term>> {
        let kind = unsafe { sys::Z3_get_ast_kind(self.context, term.0) };
        if kind == sys::Z3_QUANTIFIER_AST {
            return Ok(vec![self.term(unsafe { sys::Z3_get_quantifier_body(self.context, term.0) })?]);
        }
        match self.app(term) {
            Some(app) => {
                let n = unsafe { sys::Z3_get_app_num_args(self.context, app) };
                (0..n)
                    .map(|i| self.term(unsafe { sys::Z3_get_app_arg(self.context, app, i) }))
                    .collect()
            }
            None => Ok(Vec::new()),
        }
    }

    fn symbol_name(&self, term: &Z3Term) -> Result<String> {
        match self.term_kind(term)? {
            TermKind::BoundVariable(index) => Ok(format!("(:var {})", index)),
            TermKind::Quantifier(Quantifier::Forall) => Ok("forall".to_string()),
            TermKind::Quantifier(Quantifier::Exists) => Ok("exists".to_string()),
            _ => match self.app(term) {
                Some(app) => Ok(self.symbol_text(unsafe {
                    sys::Z3_get_decl_name(self.context, sys::Z3_get_app_decl(self.context, app))
                })),
                None => self.dump(term),
            },
        }
    }

    fn constant_value(&self, term: &Z3Term) -> Result<Option<ConstantValue>> {
        match self.term_kind(term)? {
            TermKind::True => return Ok(Some(ConstantValue::Bool(true))),
            TermKind::False => return Ok(Some(ConstantValue::Bool(false))),
            TermKind::Value => {}
            _ => return Ok(None),
        }
        if unsafe { sys::Z3_is_algebraic_number(self.context, term.0) } {
            let text = self.string(unsafe {
                sys::Z3_get_numeral_decimal_string(self.context, term.0, 16)
            });
            return Ok(Some(ConstantValue::Decimal(text)));
        }
        let text = self.string(unsafe { sys::Z3_get_numeral_string(self.context, term.0) });
        self.check_error()?;
        let invalid = || SolverError::Solver(format!("unexpected numeral {}", text));
        let value = match self.sort_to_type(&self.get_sort(term)?)? {
            FormulaType::Integer => ConstantValue::Integer(BigInt::from_str(&text).map_err(|_| invalid())?),
            FormulaType::Rational => {
                ConstantValue::Rational(BigRational::from_str(&text).map_err(|_| invalid())?)
            }
            FormulaType::Bitvector(width) => ConstantValue::Bitvector {
                value: BigInt::from_str(&text).map_err(|_| invalid())?,
                width,
            },
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn replace_children(&self, term: &Z3Term, children: &[Z3Term]) -> Result<Z3Term> {
        let args = raw(children);
        self.term(unsafe {
            sys::Z3_update_term(self.context, term.0, args.len() as u32, args.as_ptr())
        })
    }

    fn mk_func_decl(&self, name: &str, domain: &[Z3Sort], range: &Z3Sort) -> Result<Z3Decl> {
        let symbol = self.symbol(name)?;
        let domain: Vec<sys::Z3_sort> = domain.iter().map(|sort| sort.0).collect();
        self.decl(unsafe {
            sys::Z3_mk_func_decl(
                self.context,
                symbol,
                domain.len() as u32,
                domain.as_ptr(),
                range.0,
            )
        })
    }

    fn mk_app(&self, decl: &Z3Decl, args: &[Z3Term]) -> Result<Z3Term> {
        let args = raw(args);
        self.term(unsafe {
            sys::Z3_mk_app(self.context, decl.0, args.len() as u32, args.as_ptr())
        })
    }

    fn app_decl(&self, term: &Z3Term) -> Result<Option<Z3Decl>> {
        match self.app(term) {
            Some(app) if self.decl_kind(app) == sys::Z3_OP_UNINTERPRETED => {
                Ok(Some(self.decl(unsafe { sys::Z3_get_app_decl(self.context, app) })?))
            }
            _ => Ok(None),
        }
    }

    fn parse(&self, text: &str, declarations: &[Symbol<Z3Term, Z3Decl>]) -> Result<Z3Term> {
        let mut decls = Vec::with_capacity(declarations.len());
        for symbol in declarations {
            match symbol {
                Symbol::Boolean(term) | Symbol::Numeric(term) => {
                    if let Some(decl) = self.app_decl(term)? {
                        decls.push(decl.0);
                    }
                }
                Symbol::Function(decl) => decls.push(decl.0),
            }
        }
        let names: Vec<sys::Z3_symbol> = decls
            .iter()
            .map(|decl| unsafe { sys::Z3_get_decl_name(self.context, *decl) })
            .collect();
        let text = cstring(text)?;
        let vector = unsafe {
            sys::Z3_parse_smtlib2_string(
                self.context,
                text.as_ptr(),
                0,
                ptr::null(),
                ptr::null(),
                decls.len() as u32,
                names.as_ptr(),
                decls.as_ptr(),
            )
        };
        self.check_error()?;
        unsafe { sys::Z3_ast_vector_inc_ref(self.context, vector) };
        let size = unsafe { sys::Z3_ast_vector_size(self.context, vector) };
        let terms = (0..size)
            .map(|i| self.term(unsafe { sys::Z3_ast_vector_get(self.context, vector, i) }))
            .collect::<Result<Vec<_>>>();
        unsafe { sys::Z3_ast_vector_dec_ref(self.context, vector) };
        self.conjunction(&terms?)
    }

    fn dump(&self, term: &Z3Term) -> Result<String> {
        let text = self.string(unsafe { sys::Z3_ast_to_string(self.context, term.0) });
        self.check_error()?;
        Ok(text)
    }

    fn requires_reference_counting(&self) -> bool {
        true
    }

    fn inc_ref(&self, term: &Z3Term) {
        self.pin(term.0);
        if let Some(pin) = self.pinned.borrow_mut().get_mut(&term.0) {
            pin.owners += 1;
        }
    }

    fn dec_ref(&self, term: &Z3Term) {
        let mut pinned = self.pinned.borrow_mut();
        let Some(pin) = pinned.get_mut(&term.0).filter(|pin| pin.owners > 0) else {
            return;
        };
        pin.owners -= 1;
        if pin.owners == 0 && !pin.permanent {
            pinned.remove(&term.0);
            unsafe { sys::Z3_dec_ref(self.context, term.0) };
        }
    }

    fn bool_converter(&self) -> &dyn GeneralBoolConverter<Z3Sort, Z3Term> {
        self
    }

    fn try_get_numeral_converter(&self) -> Option<&dyn GeneralNumeralConverter<Z3Sort, Z3Term>> {
        Some(self)
    }

    fn try_get_bv_converter(&self) -> Option<&dyn GeneralBvConverter<Z3Sort, Z3Term>> {
        Some(self)
    }

    fn try_get_array_converter(&self) -> Option<&dyn GeneralArrayConverter<Z3Sort, Z3Term>> {
        Some(self)
    }

    fn try_get_quantifier_converter(
        &self,
    ) -> Option<&dyn GeneralQuantifierConverter<Z3Sort, Z3Term>> {
        Some(self)
    }
}

impl GeneralBoolConverter<Z3Sort, Z3Term> for Z3Context {
    fn mk_smt_bool(&self, val: bool) -> Result<Z3Term> {
        self.term(unsafe {
            if val {
                sys::Z3_mk_true(self.context)
            } else {
                sys::Z3_mk_false(self.context)
            }
        })
    }

    create_converter_unary_function_z3!(mk_not, Z3_mk_not, boolean_operands);
    create_converter_vector_function_z3!(mk_and, Z3_mk_and, boolean_operands);
    create_converter_vector_function_z3!(mk_or, Z3_mk_or, boolean_operands);
    create_converter_binary_function_z3!(mk_iff, Z3_mk_iff, boolean_operands);
    create_converter_binary_function_z3!(mk_implies, Z3_mk_implies, boolean_operands);
    create_converter_binary_function_z3!(mk_eq, Z3_mk_eq, same_sort_operands);
    create_converter_vector_function_z3!(mk_distinct, Z3_mk_distinct, same_sort_operands);

    fn mk_ite(&self, cond: &Z3Term, then_term: &Z3Term, else_term: &Z3Term) -> Result<Z3Term> {
        self.boolean_operands(&[*cond])?;
        self.same_sort_operands(&[*then_term, *else_term])?;
        self.term(unsafe { sys::Z3_mk_ite(self.context, cond.0, then_term.0, else_term.0) })
    }
}

impl GeneralNumeralConverter<Z3Sort, Z3Term> for Z3Context {
    fn mk_int_sort(&self) -> Result<Z3Sort> {
        self.sort(unsafe { sys::Z3_mk_int_sort(self.context) })
    }

    fn mk_real_sort(&self) -> Result<Z3Sort> {
        self.sort(unsafe { sys::Z3_mk_real_sort(self.context) })
    }

    fn mk_numeral(&self, value: &BigRational, sort: &Z3Sort) -> Result<Z3Term> {
        let text = if value.is_integer() {
            value.numer().to_string()
        } else {
            format!("{}/{}", value.numer(), value.denom())
        };
        let text = cstring(&text)?;
        self.term(unsafe { sys::Z3_mk_numeral(self.context, text.as_ptr(), sort.0) })
    }

    create_converter_vector_function_z3!(mk_add, Z3_mk_add);
    create_converter_pair_function_z3!(mk_sub, Z3_mk_sub);
    create_converter_pair_function_z3!(mk_mul, Z3_mk_mul);
    create_converter_unary_function_z3!(mk_neg, Z3_mk_unary_minus);
    create_converter_binary_function_z3!(mk_div, Z3_mk_div);
    create_converter_binary_function_z3!(mk_mod, Z3_mk_mod);
    create_converter_binary_function_z3!(mk_lt, Z3_mk_lt);
    create_converter_binary_function_z3!(mk_le, Z3_mk_le);
    create_converter_binary_function_z3!(mk_gt, Z3_mk_gt);
    create_converter_binary_function_z3!(mk_ge, Z3_mk_ge);
    create_converter_unary_function_z3!(mk_to_real, Z3_mk_int2real);
}

impl GeneralBvConverter<Z3Sort, Z3Term> for Z3Context {
    fn mk_bv_sort(&self, size: u32) -> Result<Z3Sort> {
        if size == 0 {
            return Err(SolverError::InvalidArgument(
                "bit-vector width must be positive".to_string(),
            ));
        }
        self.sort(unsafe { sys::Z3_mk_bv_sort(self.context, size) })
    }

    fn mk_bv_value(&self, value: &BigInt, size: u32) -> Result<Z3Term> {
        let sort = self.mk_bv_sort(size)?;
        let modulus = BigInt::one() << size as usize;
        let mut normalized = value % &modulus;
        if normalized.is_negative() {
            normalized += &modulus;
        }
        let text = cstring(&normalized.to_string())?;
        self.term(unsafe { sys::Z3_mk_numeral(self.context, text.as_ptr(), sort.0) })
    }

    create_converter_binary_function_z3!(mk_bv_add, Z3_mk_bvadd);
    create_converter_binary_function_z3!(mk_bv_sub, Z3_mk_bvsub);
    create_converter_binary_function_z3!(mk_bv_mul, Z3_mk_bvmul);
    create_converter_binary_function_z3!(mk_bv_and, Z3_mk_bvand);
    create_converter_binary_function_z3!(mk_bv_or, Z3_mk_bvor);
    create_converter_binary_function_z3!(mk_bv_xor, Z3_mk_bvxor);
    create_converter_unary_function_z3!(mk_bv_not, Z3_mk_bvnot);
    create_converter_unary_function_z3!(mk_bv_neg, Z3_mk_bvneg);
    create_converter_binary_function_z3!(mk_bv_ult, Z3_mk_bvult);
    create_converter_binary_function_z3!(mk_bv_ule, Z3_mk_bvule);
    create_converter_binary_function_z3!(mk_bv_slt, Z3_mk_bvslt);
    create_converter_binary_function_z3!(mk_bv_sle, Z3_mk_bvsle);
    create_converter_binary_function_z3!(mk_concat, Z3_mk_concat);

    fn mk_extract(&self, high: u32, low: u32, term: &Z3Term) -> Result<Z3Term> {
        self.term(unsafe { sys::Z3_mk_extract(self.context, high, low, term.0) })
    }
}

impl GeneralArrayConverter<Z3Sort, Z3Term> for Z3Context {
    fn mk_array_sort(&self, index: &Z3Sort, element: &Z3Sort) -> Result<Z3Sort> {
        self.sort(unsafe { sys::Z3_mk_array_sort(self.context, index.0, element.0) })
    }

    create_converter_binary_function_z3!(mk_select, Z3_mk_select);

    fn mk_store(&self, array: &Z3Term, index: &Z3Term, value: &Z3Term) -> Result<Z3Term> {
        self.term(unsafe { sys::Z3_mk_store(self.context, array.0, index.0, value.0) })
    }

    fn mk_const_array(&self, index: &Z3Sort, value: &Z3Term) -> Result<Z3Term> {
        self.term(unsafe { sys::Z3_mk_const_array(self.context, index.0, value.0) })
    }
}

impl GeneralQuantifierConverter<Z3Sort, Z3Term> for Z3Context {
    fn mk_quantifier(&self, quantifier: Quantifier, bound: &[Z3Term], body: &Z3Term) -> Result<Z3Term> {
        let mut apps = Vec::with_capacity(bound.len());
        for term in bound {
            match self.app(term) {
                Some(app) => apps.push(app),
                None => {
                    return Err(SolverError::InvalidArgument(format!(
                        "cannot bind {}",
                        self.dump(term)?
                    )))
                }
            }
        }
        self.term(unsafe {
            match quantifier {
                Quantifier::Forall => sys::Z3_mk_forall_const(
                    self.context,
                    0,
                    apps.len() as u32,
                    apps.as_ptr(),
                    0,
                    ptr::null(),
                    body.0,
                ),
                Quantifier::Exists => sys::Z3_mk_exists_const(
                    self.context,
                    0,
                    apps.len() as u32,
                    apps.as_ptr(),
                    0,
                    ptr::null(),
                    body.0,
                ),
            }
        })
    }

    fn eliminate_quantifiers(&self, term: &Z3Term) -> Result<Z3Term> {
        self.apply_tactic("qe", term)
    }
}

pub struct Z3Solver {
    converter: Rc<Z3Context>,
    solver: sys::Z3_solver,
    model: RefCell<Option<sys::Z3_model>>,
}

impl Z3Solver {
    pub fn new(converter: Rc<Z3Context>, options: &Options) -> Result<Self> {
        let context = converter.context;
        let solver = unsafe { sys::Z3_mk_solver(context) };
        converter.check_error()?;
        unsafe { sys::Z3_solver_inc_ref(context, solver) };
        let solver = Self {
            converter,
            solver,
            model: RefCell::new(None),
        };
        solver.configure(options)?;
        Ok(solver)
    }

    fn configure(&self, options: &Options) -> Result<()> {
        let context = self.converter.context;
        let params = unsafe { sys::Z3_mk_params(context) };
        self.converter.check_error()?;
        unsafe { sys::Z3_params_inc_ref(context, params) };
        let result = (|| {
            let seed = self.converter.symbol("random_seed")?;
            let models = self.converter.symbol("model")?;
            unsafe {
                sys::Z3_params_set_uint(context, params, seed, options.random_seed);
                sys::Z3_params_set_bool(context, params, models, options.produce_models);
            }
            if let Some(timeout) = options.timeout_millis()? {
                let key = self.converter.symbol("timeout")?;
                unsafe { sys::Z3_params_set_uint(context, params, key, timeout) };
            }
            unsafe { sys::Z3_solver_set_params(context, self.solver, params) };
            self.converter.check_error()
        })();
        unsafe { sys::Z3_params_dec_ref(context, params) };
        result
    }

    fn forget_model(&self) {
        if let Some(model) = self.model.borrow_mut().take() {
            unsafe { sys::Z3_model_dec_ref(self.converter.context, model) };
        }
    }

    fn current_model(&self) -> Result<sys::Z3_model> {
        let model = *self.model.borrow();
        model.ok_or_else(|| {
            SolverError::IllegalState(
                "no model is available, the last check was not satisfiable".to_string(),
            )
        })
    }
}

impl Drop for Z3Solver {
    fn drop(&mut self) {
        self.forget_model();
        unsafe { sys::Z3_solver_dec_ref(self.converter.context, self.solver) };
    }
}

impl GeneralSolver for Z3Solver {
    type Converter = Z3Context;

    fn converter(&self) -> &Rc<Z3Context> {
        &self.converter
    }

    fn assert(&self, term: &Z3Term) -> Result<()> {
        self.forget_model();
        unsafe { sys::Z3_solver_assert(self.converter.context, self.solver, term.0) };
        self.converter.check_error()
    }

    fn push(&self) -> Result<()> {
        self.forget_model();
        unsafe { sys::Z3_solver_push(self.converter.context, self.solver) };
        self.converter.check_error()
    }

    fn pop(&self) -> Result<()> {
        self.forget_model();
        unsafe { sys::Z3_solver_pop(self.converter.context, self.solver, 1) };
        self.converter.check_error()
    }

    fn check_sat(&self) -> Result<SolverResult> {
        self.forget_model();
        let context = self.converter.context;
        let result = unsafe { sys::Z3_solver_check(context, self.solver) };
        self.converter.check_error()?;
        let result = match result {
            sys::Z3_L_TRUE => SolverResult::Sat,
            sys::Z3_L_FALSE => SolverResult::Unsat,
            _ => SolverResult::Unknown,
        };
        if result == SolverResult::Sat {
            let model = unsafe { sys::Z3_solver_get_model(context, self.solver) };
            self.converter.check_error()?;
            unsafe { sys::Z3_model_inc_ref(context, model) };
            *self.model.borrow_mut() = Some(model);
        }
        debug!(%result, "z3 check");
        Ok(result)
    }

    fn reason_unknown(&self) -> Option<String> {
        let text = unsafe { sys::Z3_solver_get_reason_unknown(self.converter.context, self.solver) };
        self.converter.check_error().ok()?;
        Some(self.converter.string(text)).filter(|reason| !reason.is_empty())
    }

    fn eval(&self, term: &Z3Term, completion: bool) -> Result<Option<Z3Term>> {
        let model = self.current_model()?;
        let mut value: sys::Z3_ast = ptr::null_mut();
        let ok = unsafe {
            sys::Z3_model_eval(self.converter.context, model, term.0, completion, &mut value)
        };
        self.converter.check_error()?;
        if !ok || value.is_null() {
            return Ok(None);
        }
        self.converter.term(value).map(Some)
    }

    fn model_assignments(&self) -> Result<Vec<(Z3Term, Z3Term)>> {
        let model = self.current_model()?;
        let context = self.converter.context;
        let count = unsafe { sys::Z3_model_get_num_consts(context, model) };
        let mut assignments = Vec::with_capacity(count as usize);
        for i in 0..count {
            let decl = self
                .converter
                .decl(unsafe { sys::Z3_model_get_const_decl(context, model, i) })?;
            let value = unsafe { sys::Z3_model_get_const_interp(context, model, decl.0) };
            if value.is_null() {
                continue;
            }
            let key = self.converter.mk_app(&decl, &[])?;
            assignments.push((key, self.converter.term(value)?));
        }
        Ok(assignments)
    }

    /// Projects `a` onto the symbols it shares with `b` by eliminating its
    /// local constants. The result is the strongest interpolant.
    fn interpolate(&self, a: &[Z3Term], b: &[Z3Term]) -> Result<Z3Term> {
        let converter = &self.converter;
        let shared = converter.uninterpreted_symbols(b)?;
        let mut locals = Vec::new();
        for decl in converter.uninterpreted_symbols(a)? {
            if shared.contains(&decl) {
                continue;
            }
            if unsafe { sys::Z3_get_domain_size(converter.context, decl.0) } > 0 {
                return Err(SolverError::UnsupportedOperator(format!(
                    "interpolation over the local function {}",
                    converter.symbol_text(unsafe { sys::Z3_get_decl_name(converter.context, decl.0) })
                )));
            }
            locals.push(converter.mk_app(&decl, &[])?);
        }
        let conjunction = converter.conjunction(a)?;
        trace!(locals = locals.len(), "projecting interpolant");
        if locals.is_empty() {
            return Ok(conjunction);
        }
        let projected = converter.mk_quantifier(Quantifier::Exists, &locals, &conjunction)?;
        converter.apply_tactic("qe", &projected)
    }

    fn shutdown(&self) -> Result<()> {
        self.forget_model();
        unsafe { sys::Z3_solver_reset(self.converter.context, self.solver) };
        self.converter.check_error()
    }
}

pub struct Z3Interrupter {
    handle: Arc<InterruptHandle>,
}

impl Interrupter for Z3Interrupter {
    fn interrupt(&self) {
        if let Ok(slot) = self.handle.context.lock() {
            if let Some(context) = slot.as_ref() {
                unsafe { sys::Z3_interrupt(context.0) };
            }
        }
    }
}

#[derive(Default)]
pub struct Z3Factory {
    contexts: Vec<Rc<Z3Context>>,
}

impl Factory for Z3Factory {
    type Converter = Z3Context;
    type Solver = Z3Solver;
    type Interrupter = Z3Interrupter;

    fn new_context(&mut self, _options: &Options) -> Result<Rc<Z3Context>> {
        let context = Rc::new(Z3Context::new()?);
        self.contexts.push(context.clone());
        Ok(context)
    }

    fn delete_context(&mut self, context: Rc<Z3Context>) {
        self.contexts.retain(|known| !Rc::ptr_eq(known, &context));
    }

    fn new_solver(&mut self, context: &Rc<Z3Context>, options: &Options) -> Result<Z3Solver> {
        Z3Solver::new(context.clone(), options)
    }

    fn new_interrupter(&self, solver: &Z3Solver) -> Z3Interrupter {
        Z3Interrupter {
            handle: solver.converter.interrupt.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_var(context: &Z3Context, name: &str) -> Z3Term {
        context
            .mk_smt_symbol(name, &context.mk_int_sort().unwrap())
            .unwrap()
    }

    fn int(context: &Z3Context, value: i64) -> Z3Term {
        context
            .mk_numeral(
                &BigRational::from_integer(value.into()),
                &context.mk_int_sort().unwrap(),
            )
            .unwrap()
    }

    #[test]
    fn sorts_are_classified() {
        let context = Z3Context::new().unwrap();
        let ty = FormulaType::array(FormulaType::Bitvector(8), FormulaType::Rational);
        let sort = context.type_to_sort(&ty).unwrap();
        assert_eq!(context.sort_to_type(&sort).unwrap(), ty);
        assert!(matches!(
            context.type_to_sort(&FormulaType::FloatingPoint { exponent: 8, mantissa: 24 }),
            Err(SolverError::UnsupportedTheory(_))
        ));
    }

    #[test]
    fn numerals_read_back() {
        let context = Z3Context::new().unwrap();
        let half = context
            .mk_numeral(&BigRational::new((-1).into(), 2.into()), &context.mk_real_sort().unwrap())
            .unwrap();
        assert_eq!(
            context.constant_value(&half).unwrap(),
            Some(ConstantValue::Rational(BigRational::new((-1).into(), 2.into())))
        );
        let bits = context.mk_bv_value(&BigInt::from(-1), 4).unwrap();
        assert_eq!(
            context.constant_value(&bits).unwrap(),
            Some(ConstantValue::Bitvector {
                value: BigInt::from(15),
                width: 4
            })
        );
        assert_eq!(context.term_kind(&int_var(&context, "x")).unwrap(), TermKind::Variable);
    }

    #[test]
    fn released_formulas_give_back_native_references() {
        use crate::boolean::BooleanFormulaManager;
        use crate::creator::FormulaCreator;

        let context = Rc::new(Z3Context::new().unwrap());
        let mut options = Options::default();
        options.set_track_native_references(true);
        let creator = Rc::new(FormulaCreator::new(context.clone(), &options).unwrap());
        let bmgr = BooleanFormulaManager::new(creator.clone());
        let p = bmgr.make_variable("p").unwrap();
        let q = bmgr.make_variable("q").unwrap();
        let baseline = context.pinned_asts();

        let conjunction = bmgr.and(&p, &q).unwrap();
        let negation = bmgr.not(&conjunction).unwrap();
        let operand = context.children(&creator.extract_boolean(&negation).unwrap()).unwrap();
        assert_eq!(operand, vec![creator.extract_boolean(&conjunction).unwrap()]);
        assert_eq!(context.pinned_asts(), baseline + 2);

        // The negation keeps its operand alive natively.
        drop(conjunction);
        assert_eq!(creator.clean_up_references(), 1);
        assert_eq!(context.pinned_asts(), baseline + 1);
        assert_eq!(context.term_kind(&operand[0]).unwrap(), TermKind::And);

        drop(negation);
        creator.clean_up_references();
        assert_eq!(context.pinned_asts(), baseline);

        // Cached variables keep their reference.
        drop(p);
        creator.clean_up_references();
        let again = bmgr.make_variable("p").unwrap();
        assert_eq!(context.term_kind(&creator.extract_boolean(&again).unwrap()).unwrap(), TermKind::Variable);
        assert!(bmgr.and(&again, &q).is_ok());
    }

    #[test]
    fn sort_errors_are_reported_not_fatal() {
        let context = Z3Context::new().unwrap();
        let x = int_var(&context, "x");
        let p = context
            .mk_smt_symbol("p", &context.mk_bool_sort().unwrap())
            .unwrap();
        assert!(matches!(
            context.mk_and(&[x, p]),
            Err(SolverError::TypeMismatch { .. })
        ));
        assert!(matches!(
            context.mk_eq(&x, &p),
            Err(SolverError::TypeMismatch { .. })
        ));
        assert!(context.mk_not(&p).is_ok());

        // Operators without a local check surface Z3's own complaint.
        let narrow = context.mk_bv_value(&BigInt::from(1), 4).unwrap();
        let wide = context.mk_bv_value(&BigInt::from(1), 8).unwrap();
        let err = context.mk_bv_add(&narrow, &wide).unwrap_err();
        assert!(matches!(err, SolverError::InvalidArgument(_)));
        assert!(!err.is_recoverable());
        // The error state does not leak into the next call.
        assert!(context.mk_bv_add(&narrow, &narrow).is_ok());
    }

    #[test]
    fn parse_uses_declared_symbols() {
        let context = Z3Context::new().unwrap();
        let x = int_var(&context, "x");
        let parsed = context
            .parse("(assert (> x 1)) (assert (< x 3))", &[Symbol::Numeric(x)])
            .unwrap();
        assert_eq!(context.term_kind(&parsed).unwrap(), TermKind::And);
        assert!(context.parse("(assert (> y 1))", &[]).is_err());
    }

    #[test]
    fn quantifier_elimination_removes_bound_variables() {
        let context = Z3Context::new().unwrap();
        let x = int_var(&context, "x");
        let y = int_var(&context, "y");
        let body = context
            .mk_and(&[context.mk_gt(&x, &int(&context, 0)).unwrap(), context.mk_eq(&y, &x).unwrap()])
            .unwrap();
        let exists = context.mk_quantifier(Quantifier::Exists, &[x], &body).unwrap();
        assert!(matches!(
            context.term_kind(&exists).unwrap(),
            TermKind::Quantifier(Quantifier::Exists)
        ));
        let projected = context.eliminate_quantifiers(&exists).unwrap();
        let symbols = context.uninterpreted_symbols(&[projected]).unwrap();
        assert_eq!(symbols.len(), 1);
        assert!(symbols.contains(&context.app_decl(&y).unwrap().unwrap()));
    }

    #[test]
    fn interpolant_separates_partitions() {
        let context = Rc::new(Z3Context::new().unwrap());
        let solver = Z3Solver::new(context.clone(), &Options::default()).unwrap();
        let x = int_var(&context, "x");
        let y = int_var(&context, "y");
        let zero = int(&context, 0);
        let a = [context.mk_gt(&x, &zero).unwrap(), context.mk_eq(&y, &x).unwrap()];
        let b = [context.mk_lt(&y, &zero).unwrap()];
        let interpolant = solver.interpolate(&a, &b).unwrap();

        let check = Z3Solver::new(context.clone(), &Options::default()).unwrap();
        check.push().unwrap();
        check.assert(&context.conjunction(&a).unwrap()).unwrap();
        check.assert(&context.mk_not(&interpolant).unwrap()).unwrap();
        assert_eq!(check.check_sat().unwrap(), SolverResult::Unsat);
        check.pop().unwrap();
        check.assert(&interpolant).unwrap();
        check.assert(&b[0]).unwrap();
        assert_eq!(check.check_sat().unwrap(), SolverResult::Unsat);
    }

    #[test]
    fn interrupter_outliving_context_is_harmless() {
        let mut factory = Z3Factory::default();
        let context = factory.new_context(&Options::default()).unwrap();
        let solver = factory.new_solver(&context, &Options::default()).unwrap();
        let interrupter = factory.new_interrupter(&solver);
        interrupter.interrupt();
        drop(solver);
        factory.delete_context(context);
        interrupter.interrupt();
    }
}
