use core::fmt;
use num_bigint::BigInt;
use num_rational::BigRational;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use crate::error::{Result, SolverError};
use crate::options::Options;
use crate::term::{FormulaType, Symbol};

pub trait GeneralSort: Clone + Eq + Hash + Debug {}

pub trait GeneralTerm: Clone + Eq + Hash + Debug {}

pub trait GeneralDecl: Clone + Eq + Hash + Debug {}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum SolverResult {
    Sat,
    Unsat,
    Unknown,
}

impl fmt::Display for SolverResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let printable = match *self {
            SolverResult::Sat => "sat",
            SolverResult::Unsat => "unsat",
            SolverResult::Unknown => "unknown",
        };
        write!(f, "{}", printable)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum Quantifier {
    Forall,
    Exists,
}

/// Node kinds a backend reports for its terms.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum TermKind {
    True,
    False,
    Not,
    And,
    Or,
    Xor,
    Iff,
    Implies,
    Ite,
    Eq,
    Distinct,
    /// A literal value of a non-boolean sort.
    Value,
    /// A free constant, i.e. an uninterpreted symbol without arguments.
    Variable,
    /// A variable bound by an enclosing quantifier, with its de Bruijn index.
    BoundVariable(u32),
    Quantifier(Quantifier),
    /// Application of an uninterpreted function with at least one argument.
    Uf,
    /// Any other operator with built-in theory semantics.
    Interpreted,
    Unknown,
}

#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum ConstantValue {
    Bool(bool),
    Integer(BigInt),
    Rational(BigRational),
    /// Decimal approximation of a value without a finite rational form.
    Decimal(String),
    Bitvector { value: BigInt, width: u32 },
}

/// Core term capability every backend supplies.
pub trait GeneralConverter {
    type Sort: GeneralSort;
    type Term: GeneralTerm;
    type FuncDecl: GeneralDecl;

    fn mk_bool_sort(&self) -> Result<Self::Sort>;
    fn mk_smt_symbol(&self, name: &str, sort: &Self::Sort) -> Result<Self::Term>;
    fn get_sort(&self, term: &Self::Term) -> Result<Self::Sort>;
    /// Classifies a native sort, failing for sorts this layer does not model.
    fn sort_to_type(&self, sort: &Self::Sort) -> Result<FormulaType>;
    fn type_to_sort(&self, formula_type: &FormulaType) -> Result<Self::Sort>;

    fn term_kind(&self, term: &Self::Term) -> Result<TermKind>;
    fn children(&self, term: &Self::Term) -> Result<Vec<Self::Term>>;
    /// Name of the symbol or operator at the root of `term`.
    fn symbol_name(&self, term: &Self::Term) -> Result<String>;
    fn constant_value(&self, term: &Self::Term) -> Result<Option<ConstantValue>>;
    /// Builds the node `term` again over new children of the same sorts.
    fn replace_children(&self, term: &Self::Term, children: &[Self::Term]) -> Result<Self::Term>;

    fn mk_func_decl(
        &self,
        name: &str,
        domain: &[Self::Sort],
        range: &Self::Sort,
    ) -> Result<Self::FuncDecl>;
    fn mk_app(&self, decl: &Self::FuncDecl, args: &[Self::Term]) -> Result<Self::Term>;
    /// Declaration of an uninterpreted application or constant.
    fn app_decl(&self, term: &Self::Term) -> Result<Option<Self::FuncDecl>>;

    /// Parses SMT-LIB text; `declarations` lists every symbol the text may refer to.
    fn parse(
        &self,
        _text: &str,
        _declarations: &[Symbol<Self::Term, Self::FuncDecl>],
    ) -> Result<Self::Term> {
        Err(SolverError::UnsupportedOperator("parse".to_string()))
    }
    fn dump(&self, term: &Self::Term) -> Result<String>;

    fn requires_reference_counting(&self) -> bool {
        false
    }
    fn inc_ref(&self, _term: &Self::Term) {}
    fn dec_ref(&self, _term: &Self::Term) {}

    fn bool_converter(&self) -> &dyn GeneralBoolConverter<Self::Sort, Self::Term>;
    fn try_get_numeral_converter(&self)
        -> Option<&dyn GeneralNumeralConverter<Self::Sort, Self::Term>>;
    fn try_get_bv_converter(&self) -> Option<&dyn GeneralBvConverter<Self::Sort, Self::Term>>;
    fn try_get_array_converter(&self)
        -> Option<&dyn GeneralArrayConverter<Self::Sort, Self::Term>>;
    fn try_get_quantifier_converter(
        &self,
    ) -> Option<&dyn GeneralQuantifierConverter<Self::Sort, Self::Term>>;
}

pub trait GeneralBoolConverter<S: GeneralSort, T: GeneralTerm> {
    fn mk_smt_bool(&self, val: bool) -> Result<T>;
    fn mk_not(&self, term: &T) -> Result<T>;
    fn mk_and(&self, terms: &[T]) -> Result<T>;
    fn mk_or(&self, terms: &[T]) -> Result<T>;
    fn mk_iff(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_implies(&self, term1: &T, term2: &T) -> Result<T>;
    /// If-then-else over branches of any (equal) sort.
    fn mk_ite(&self, cond: &T, then_term: &T, else_term: &T) -> Result<T>;
    fn mk_eq(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_distinct(&self, terms: &[T]) -> Result<T>;
}

pub trait GeneralNumeralConverter<S: GeneralSort, T: GeneralTerm> {
    fn mk_int_sort(&self) -> Result<S>;
    fn mk_real_sort(&self) -> Result<S>;
    fn mk_numeral(&self, value: &BigRational, sort: &S) -> Result<T>;
    fn mk_add(&self, terms: &[T]) -> Result<T>;
    fn mk_sub(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_mul(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_neg(&self, term: &T) -> Result<T>;
    fn mk_div(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_mod(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_lt(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_le(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_gt(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_ge(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_to_real(&self, term: &T) -> Result<T>;
}

pub trait GeneralBvConverter<S: GeneralSort, T: GeneralTerm> {
    fn mk_bv_sort(&self, size: u32) -> Result<S>;
    fn mk_bv_value(&self, value: &BigInt, size: u32) -> Result<T>;
    fn mk_bv_add(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_bv_sub(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_bv_mul(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_bv_and(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_bv_or(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_bv_xor(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_bv_not(&self, term: &T) -> Result<T>;
    fn mk_bv_neg(&self, term: &T) -> Result<T>;
    fn mk_bv_ult(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_bv_ule(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_bv_slt(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_bv_sle(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_concat(&self, term1: &T, term2: &T) -> Result<T>;
    fn mk_extract(&self, high: u32, low: u32, term: &T) -> Result<T>;
}

pub trait GeneralArrayConverter<S: GeneralSort, T: GeneralTerm> {
    fn mk_array_sort(&self, index: &S, element: &S) -> Result<S>;
    fn mk_select(&self, array: &T, index: &T) -> Result<T>;
    fn mk_store(&self, array: &T, index: &T, value: &T) -> Result<T>;
    fn mk_const_array(&self, index: &S, value: &T) -> Result<T>;
}

pub trait GeneralQuantifierConverter<S: GeneralSort, T: GeneralTerm> {
    /// Binds the free constants `bound` in `body`.
    fn mk_quantifier(&self, quantifier: Quantifier, bound: &[T], body: &T) -> Result<T>;
    fn eliminate_quantifiers(&self, term: &T) -> Result<T>;
}

/// One native solving session on top of a converter's terms.
pub trait GeneralSolver {
    type Converter: GeneralConverter;

    fn converter(&self) -> &Rc<Self::Converter>;

    fn assert(&self, term: &Term<Self>) -> Result<()>;
    fn push(&self) -> Result<()>;
    fn pop(&self) -> Result<()>;
    fn check_sat(&self) -> Result<SolverResult>;
    fn reason_unknown(&self) -> Option<String>;
    /// Evaluates `term` in the model of the last satisfiable check.
    fn eval(&self, term: &Term<Self>, completion: bool) -> Result<Option<Term<Self>>>;
    /// Pairs of constant and value from the model of the last satisfiable check.
    fn model_assignments(&self) -> Result<Vec<(Term<Self>, Term<Self>)>>;

    /// Makes a symbol known to the session.
    fn declare(&self, _symbol: &Symbol<Term<Self>, Decl<Self>>) -> Result<()> {
        Ok(())
    }
    /// Whether a native pop also drops the declarations made above the popped level.
    fn forgets_declarations_on_pop(&self) -> bool {
        false
    }
    /// Interpolant of the conjunction of `a` against the conjunction of `b`.
    fn interpolate(&self, _a: &[Term<Self>], _b: &[Term<Self>]) -> Result<Term<Self>> {
        Err(SolverError::UnsupportedOperator("interpolation".to_string()))
    }
    fn register_abbreviations(&self, _shared: &[Term<Self>]) -> Result<()> {
        Ok(())
    }
    /// Discards all native state of the session.
    fn shutdown(&self) -> Result<()>;
}

pub type Term<S> = <<S as GeneralSolver>::Converter as GeneralConverter>::Term;
pub type Decl<S> = <<S as GeneralSolver>::Converter as GeneralConverter>::FuncDecl;

pub trait Interrupter: Send + Sync {
    fn interrupt(&self);
}

pub trait Factory {
    type Converter: GeneralConverter + 'static;
    type Solver: GeneralSolver<Converter = Self::Converter> + 'static;
    type Interrupter: Interrupter + 'static;

    fn new_context(&mut self, options: &Options) -> Result<Rc<Self::Converter>>;
    fn delete_context(&mut self, context: Rc<Self::Converter>);
    fn new_solver(
        &mut self,
        context: &Rc<Self::Converter>,
        options: &Options,
    ) -> Result<Self::Solver>;
    fn new_interrupter(&self, solver: &Self::Solver) -> Self::Interrupter;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solver_result_prints_smtlib_names() {
        assert_eq!(SolverResult::Sat.to_string(), "sat");
        assert_eq!(SolverResult::Unsat.to_string(), "unsat");
        assert_eq!(SolverResult::Unknown.to_string(), "unknown");
    }
}
