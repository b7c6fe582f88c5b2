use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, SolverError};
use crate::generalized::{
    ConstantValue, Factory, GeneralArrayConverter, GeneralBoolConverter, GeneralBvConverter,
    GeneralConverter, GeneralDecl, GeneralNumeralConverter, GeneralQuantifierConverter,
    GeneralSolver, GeneralSort, GeneralTerm, Interrupter, Quantifier, SolverResult, TermKind,
};
use crate::options::Options;
use crate::term::{FormulaType, Symbol};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum DummySort {
    Bool,
    Int,
    Real,
    Bv(u32),
    Array(Box<DummySort>, Box<DummySort>),
}

impl GeneralSort for DummySort {}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct DummyTerm(u32);

impl GeneralTerm for DummyTerm {}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct DummyDecl(u32);

impl GeneralDecl for DummyDecl {}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
enum Op {
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
    /// Constants are applications without arguments.
    Apply(DummyDecl),
    Bound(u32),
    Quantifier(Quantifier, Vec<(String, DummySort)>),
    Int(BigInt),
    Real(BigRational),
    BvValue(BigInt, u32),
    Arith(&'static str),
    BvOp(&'static str),
    Extract(u32, u32),
    Select,
    Store,
    ConstArray,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct Node {
    op: Op,
    args: Vec<DummyTerm>,
    sort: DummySort,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct DeclInfo {
    name: String,
    domain: Vec<DummySort>,
    range: DummySort,
}

fn sort_type(sort: &DummySort) -> FormulaType {
    match sort {
        DummySort::Bool => FormulaType::Boolean,
        DummySort::Int => FormulaType::Integer,
        DummySort::Real => FormulaType::Rational,
        DummySort::Bv(width) => FormulaType::Bitvector(*width),
        DummySort::Array(index, element) => FormulaType::array(sort_type(index), sort_type(element)),
    }
}

fn mismatch(expected: &DummySort, actual: &DummySort) -> SolverError {
    SolverError::type_mismatch(&sort_type(expected), &sort_type(actual))
}

/// In-process term store. Terms are hash-consed, so building the same node
/// twice yields the same handle.
#[derive(Default)]
pub struct DummyContext {
    nodes: RefCell<Vec<Node>>,
    index: RefCell<FxHashMap<Node, DummyTerm>>,
    decls: RefCell<Vec<DeclInfo>>,
    decl_index: RefCell<FxHashMap<DeclInfo, DummyDecl>>,
    reference_counting: bool,
    ref_counts: RefCell<FxHashMap<DummyTerm, usize>>,
}

impl DummyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference_counting(reference_counting: bool) -> Self {
        Self {
            reference_counting,
            ..Self::default()
        }
    }

    /// Outstanding references taken through `inc_ref`.
    pub fn ref_count(&self, term: &DummyTerm) -> usize {
        self.ref_counts.borrow().get(term).copied().unwrap_or(0)
    }

    fn node(&self, term: &DummyTerm) -> Result<Node> {
        self.nodes
            .borrow()
            .get(term.0 as usize)
            .cloned()
            .ok_or_else(|| SolverError::InvalidArgument(format!("unknown term {:?}", term)))
    }

    fn decl_info(&self, decl: &DummyDecl) -> Result<DeclInfo> {
        self.decls
            .borrow()
            .get(decl.0 as usize)
            .cloned()
            .ok_or_else(|| SolverError::InvalidArgument(format!("unknown declaration {:?}", decl)))
    }

    fn sort(&self, term: &DummyTerm) -> Result<DummySort> {
        Ok(self.node(term)?.sort)
    }

    fn intern(&self, op: Op, args: Vec<DummyTerm>, sort: DummySort) -> DummyTerm {
        let node = Node { op, args, sort };
        if let Some(term) = self.index.borrow().get(&node) {
            return *term;
        }
        let mut nodes = self.nodes.borrow_mut();
        let term = DummyTerm(nodes.len() as u32);
        nodes.push(node.clone());
        self.index.borrow_mut().insert(node, term);
        term
    }

    fn intern_decl(&self, info: DeclInfo) -> DummyDecl {
        if let Some(decl) = self.decl_index.borrow().get(&info) {
            return *decl;
        }
        let mut decls = self.decls.borrow_mut();
        let decl = DummyDecl(decls.len() as u32);
        decls.push(info.clone());
        self.decl_index.borrow_mut().insert(info, decl);
        decl
    }

    fn expect(&self, term: &DummyTerm, expected: &DummySort) -> Result<()> {
        let actual = self.sort(term)?;
        if &actual == expected {
            Ok(())
        } else {
            Err(mismatch(expected, &actual))
        }
    }

    fn same_sort(&self, terms: &[DummyTerm]) -> Result<DummySort> {
        let first = terms
            .first()
            .ok_or_else(|| SolverError::InvalidArgument("operator needs arguments".to_string()))?;
        let sort = self.sort(first)?;
        for term in &terms[1..] {
            self.expect(term, &sort)?;
        }
        Ok(sort)
    }

    fn connective(&self, op: Op, terms: &[DummyTerm]) -> Result<DummyTerm> {
        for term in terms {
            self.expect(term, &DummySort::Bool)?;
        }
        Ok(self.intern(op, terms.to_vec(), DummySort::Bool))
    }

    fn arith(&self, name: &'static str, terms: &[DummyTerm]) -> Result<DummyTerm> {
        let sort = self.same_sort(terms)?;
        if sort != DummySort::Int && sort != DummySort::Real {
            return Err(mismatch(&DummySort::Real, &sort));
        }
        Ok(self.intern(Op::Arith(name), terms.to_vec(), sort))
    }

    fn comparison(&self, name: &'static str, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        let sort = self.same_sort(&[*term1, *term2])?;
        if sort != DummySort::Int && sort != DummySort::Real {
            return Err(mismatch(&DummySort::Real, &sort));
        }
        Ok(self.intern(Op::Arith(name), vec![*term1, *term2], DummySort::Bool))
    }

    fn bv_width(&self, term: &DummyTerm) -> Result<u32> {
        match self.sort(term)? {
            DummySort::Bv(width) => Ok(width),
            other => Err(SolverError::type_mismatch(
                &FormulaType::Bitvector(0),
                &sort_type(&other),
            )),
        }
    }

    fn bv(&self, name: &'static str, terms: &[DummyTerm], predicate: bool) -> Result<DummyTerm> {
        let width = self.bv_width(&terms[0])?;
        for term in &terms[1..] {
            self.expect(term, &DummySort::Bv(width))?;
        }
        let sort = if predicate {
            DummySort::Bool
        } else {
            DummySort::Bv(width)
        };
        Ok(self.intern(Op::BvOp(name), terms.to_vec(), sort))
    }

    /// Replaces the constants in `bound` by de Bruijn indexed variables.
    fn abstract_bound(
        &self,
        term: DummyTerm,
        bound: &FxHashMap<DummyTerm, u32>,
        depth: u32,
        memo: &mut FxHashMap<(DummyTerm, u32), DummyTerm>,
    ) -> Result<DummyTerm> {
        if let Some(done) = memo.get(&(term, depth)) {
            return Ok(*done);
        }
        let node = self.node(&term)?;
        let result = if let Some(index) = bound.get(&term) {
            self.intern(Op::Bound(index + depth), Vec::new(), node.sort)
        } else if node.args.is_empty() {
            term
        } else {
            let inner = match &node.op {
                Op::Quantifier(_, vars) => depth + vars.len() as u32,
                _ => depth,
            };
            let args = node
                .args
                .iter()
                .map(|arg| self.abstract_bound(*arg, bound, inner, memo))
                .collect::<Result<Vec<_>>>()?;
            self.intern(node.op, args, node.sort)
        };
        memo.insert((term, depth), result);
        Ok(result)
    }

    fn head(&self, node: &Node) -> Result<String> {
        Ok(match &node.op {
            Op::True => "true".to_string(),
            Op::False => "false".to_string(),
            Op::Not => "not".to_string(),
            Op::And => "and".to_string(),
            Op::Or => "or".to_string(),
            Op::Xor => "xor".to_string(),
            Op::Iff | Op::Eq => "=".to_string(),
            Op::Implies => "=>".to_string(),
            Op::Ite => "ite".to_string(),
            Op::Distinct => "distinct".to_string(),
            Op::Apply(decl) => self.decl_info(decl)?.name,
            Op::Bound(index) => format!("(:var {})", index),
            Op::Int(value) if value.is_negative() => format!("(- {})", value.abs()),
            Op::Int(value) => value.to_string(),
            Op::Real(value) => format!("(/ {} {})", value.numer(), value.denom()),
            Op::BvValue(value, width) => format!("(_ bv{} {})", value, width),
            Op::Arith(name) | Op::BvOp(name) => name.to_string(),
            Op::Extract(high, low) => format!("(_ extract {} {})", high, low),
            Op::Select => "select".to_string(),
            Op::Store => "store".to_string(),
            Op::ConstArray => format!("(as const {})", render_sort(&node.sort)),
            Op::Quantifier(quantifier, vars) => {
                let keyword = match quantifier {
                    Quantifier::Forall => "forall",
                    Quantifier::Exists => "exists",
                };
                let bindings = vars
                    .iter()
                    .map(|(name, sort)| format!("({} {})", name, render_sort(sort)))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{} ({})", keyword, bindings)
            }
        })
    }

    fn render(&self, term: &DummyTerm, out: &mut String) -> Result<()> {
        let node = self.node(term)?;
        let head = self.head(&node)?;
        if node.args.is_empty() {
            out.push_str(&head);
            return Ok(());
        }
        out.push('(');
        out.push_str(&head);
        for arg in &node.args {
            out.push(' ');
            self.render(arg, out)?;
        }
        out.push(')');
        Ok(())
    }

    fn default_value(&self, sort: &DummySort) -> Option<Value> {
        match sort {
            DummySort::Bool => Some(Value::Bool(false)),
            DummySort::Int | DummySort::Real => Some(Value::Number(BigRational::zero())),
            DummySort::Bv(_) => Some(Value::Bits(BigInt::zero())),
            DummySort::Array(..) => None,
        }
    }

    /// Folds `term` to a literal where that is possible without search.
    fn fold(
        &self,
        term: &DummyTerm,
        complete: bool,
        memo: &mut FxHashMap<DummyTerm, Option<Value>>,
    ) -> Result<Option<Value>> {
        if let Some(done) = memo.get(term) {
            return Ok(done.clone());
        }
        let node = self.node(term)?;
        let mut args = Vec::with_capacity(node.args.len());
        for arg in &node.args {
            args.push(self.fold(arg, complete, memo)?);
        }
        let bools = |args: &[Option<Value>]| -> Vec<Option<bool>> {
            args.iter()
                .map(|arg| match arg {
                    Some(Value::Bool(b)) => Some(*b),
                    _ => None,
                })
                .collect()
        };
        let numbers = |args: &[Option<Value>]| -> Option<Vec<BigRational>> {
            args.iter()
                .map(|arg| match arg {
                    Some(Value::Number(n)) => Some(n.clone()),
                    _ => None,
                })
                .collect()
        };
        let all_known = |args: &[Option<Value>]| -> Option<Vec<Value>> { args.iter().cloned().collect() };
        let result = match &node.op {
            Op::True => Some(Value::Bool(true)),
            Op::False => Some(Value::Bool(false)),
            Op::Int(value) => Some(Value::Number(BigRational::from_integer(value.clone()))),
            Op::Real(value) => Some(Value::Number(value.clone())),
            Op::BvValue(value, _) => Some(Value::Bits(value.clone())),
            Op::Apply(_) if node.args.is_empty() && complete => self.default_value(&node.sort),
            Op::Not => bools(&args)[0].map(|b| Value::Bool(!b)),
            Op::And => {
                let values = bools(&args);
                if values.contains(&Some(false)) {
                    Some(Value::Bool(false))
                } else if values.iter().all(|v| *v == Some(true)) {
                    Some(Value::Bool(true))
                } else {
                    None
                }
            }
            Op::Or => {
                let values = bools(&args);
                if values.contains(&Some(true)) {
                    Some(Value::Bool(true))
                } else if values.iter().all(|v| *v == Some(false)) {
                    Some(Value::Bool(false))
                } else {
                    None
                }
            }
            Op::Implies => match bools(&args).as_slice() {
                [Some(false), _] | [_, Some(true)] => Some(Value::Bool(true)),
                [Some(true), Some(false)] => Some(Value::Bool(false)),
                _ => None,
            },
            Op::Xor => match bools(&args).as_slice() {
                [Some(a), Some(b)] => Some(Value::Bool(a != b)),
                _ => None,
            },
            Op::Iff | Op::Eq => {
                if node.args.windows(2).all(|pair| pair[0] == pair[1]) {
                    Some(Value::Bool(true))
                } else {
                    all_known(&args).map(|values| Value::Bool(values.windows(2).all(|p| p[0] == p[1])))
                }
            }
            Op::Distinct => all_known(&args).map(|values| {
                let distinct = values
                    .iter()
                    .enumerate()
                    .all(|(i, v)| values[i + 1..].iter().all(|w| v != w));
                Value::Bool(distinct)
            }),
            Op::Ite => match &args[0] {
                Some(Value::Bool(true)) => args[1].clone(),
                Some(Value::Bool(false)) => args[2].clone(),
                _ if node.args[1] == node.args[2] => args[1].clone(),
                _ => None,
            },
            Op::Arith(name) => numbers(&args).and_then(|n| fold_arith(name, &n)),
            _ => None,
        };
        memo.insert(*term, result.clone());
        Ok(result)
    }

    fn literal(&self, value: Value, sort: &DummySort) -> Result<DummyTerm> {
        match (value, sort) {
            (Value::Bool(b), _) => self.mk_smt_bool(b),
            (Value::Number(n), sort) => self.mk_numeral(&n, sort),
            (Value::Bits(bits), DummySort::Bv(width)) => self.mk_bv_value(&bits, *width),
            (_, sort) => Err(SolverError::UnsupportedTheory(format!(
                "values of sort {}",
                sort_type(sort)
            ))),
        }
    }

    fn symbols_of(&self, term: &DummyTerm, found: &mut FxHashSet<DummyDecl>) -> Result<()> {
        let node = self.node(term)?;
        if let Op::Apply(decl) = node.op {
            found.insert(decl);
        }
        for arg in &node.args {
            self.symbols_of(arg, found)?;
        }
        Ok(())
    }
}

#[derive(Clone, PartialEq, Debug)]
enum Value {
    Bool(bool),
    Number(BigRational),
    Bits(BigInt),
}

fn fold_arith(name: &str, args: &[BigRational]) -> Option<Value> {
    let number = |n: BigRational| Some(Value::Number(n));
    let truth = |b: bool| Some(Value::Bool(b));
    match (name, args) {
        ("+", _) => number(args.iter().cloned().sum()),
        ("*", [a, b]) => number(a * b),
        ("-", [a]) => number(-a.clone()),
        ("-", [a, b]) => number(a - b),
        ("/", [a, b]) if !b.is_zero() => number(a / b),
        ("to_real", [a]) => number(a.clone()),
        ("<", [a, b]) => truth(a < b),
        ("<=", [a, b]) => truth(a <= b),
        (">", [a, b]) => truth(a > b),
        (">=", [a, b]) => truth(a >= b),
        _ => None,
    }
}

fn render_sort(sort: &DummySort) -> String {
    match sort {
        DummySort::Bool => "Bool".to_string(),
        DummySort::Int => "Int".to_string(),
        DummySort::Real => "Real".to_string(),
        DummySort::Bv(width) => format!("(_ BitVec {})", width),
        DummySort::Array(index, element) => {
            format!("(Array {} {})", render_sort(index), render_sort(element))
        }
    }
}

impl GeneralConverter for DummyContext {
    type Sort = DummySort;
    type Term = DummyTerm;
    type FuncDecl = DummyDecl;

    fn mk_bool_sort(&self) -> Result<DummySort> {
        Ok(DummySort::Bool)
    }

    fn mk_smt_symbol(&self, name: &str, sort: &DummySort) -> Result<DummyTerm> {
        let decl = self.mk_func_decl(name, &[], sort)?;
        self.mk_app(&decl, &[])
    }

    fn get_sort(&self, term: &DummyTerm) -> Result<DummySort> {
        self.sort(term)
    }

    fn sort_to_type(&self, sort: &DummySort) -> Result<FormulaType> {
        Ok(sort_type(sort))
    }

    fn type_to_sort(&self, formula_type: &FormulaType) -> Result<DummySort> {
        match formula_type {
            FormulaType::Boolean => Ok(DummySort::Bool),
            FormulaType::Integer => Ok(DummySort::Int),
            FormulaType::Rational => Ok(DummySort::Real),
            FormulaType::Bitvector(width) => Ok(DummySort::Bv(*width)),
            FormulaType::Array(index, element) => Ok(DummySort::Array(
                Box::new(self.type_to_sort(index)?),
                Box::new(self.type_to_sort(element)?),
            )),
            FormulaType::FloatingPoint { .. } => {
                Err(SolverError::UnsupportedTheory("floating point".to_string()))
            }
        }
    }

    fn term_kind(&self, term: &DummyTerm) -> Result<TermKind> {
        let node = self.node(term)?;
        Ok(match node.op {
            Op::True => TermKind::True,
            Op::False => TermKind::False,
            Op::Not => TermKind::Not,
            Op::And => TermKind::And,
            Op::Or => TermKind::Or,
            Op::Xor => TermKind::Xor,
            Op::Iff => TermKind::Iff,
            Op::Implies => TermKind::Implies,
            Op::Ite => TermKind::Ite,
            Op::Eq => TermKind::Eq,
            Op::Distinct => TermKind::Distinct,
            Op::Apply(_) if node.args.is_empty() => TermKind::Variable,
            Op::Apply(_) => TermKind::Uf,
            Op::Bound(index) => TermKind::BoundVariable(index),
            Op::Quantifier(quantifier, _) => TermKind::Quantifier(quantifier),
            Op::Int(_) | Op::Real(_) | Op::BvValue(..) => TermKind::Value,
            _ => TermKind::Interpreted,
        })
    }

    fn children(&self, term: &DummyTerm) -> Result<Vec<DummyTerm>> {
        Ok(self.node(term)?.args)
    }

    fn symbol_name(&self, term: &DummyTerm) -> Result<String> {
        self.head(&self.node(term)?)
    }

    fn constant_value(&self, term: &DummyTerm) -> Result<Option<ConstantValue>> {
        Ok(match self.node(term)?.op {
            Op::True => Some(ConstantValue::Bool(true)),
            Op::False => Some(ConstantValue::Bool(false)),
            Op::Int(value) => Some(ConstantValue::Integer(value)),
            Op::Real(value) => Some(ConstantValue::Rational(value)),
            Op::BvValue(value, width) => Some(ConstantValue::Bitvector { value, width }),
            _ => None,
        })
    }

    fn replace_children(&self, term: &DummyTerm, children: &[DummyTerm]) -> Result<DummyTerm> {
        let node = self.node(term)?;
        if node.args.len() != children.len() {
            return Err(SolverError::InvalidArgument(format!(
                "expected {} children, got {}",
                node.args.len(),
                children.len()
            )));
        }
        for (old, new) in node.args.iter().zip(children) {
            self.expect(new, &self.sort(old)?)?;
        }
        Ok(self.intern(node.op, children.to_vec(), node.sort))
    }

    fn mk_func_decl(&self, name: &str, domain: &[DummySort], range: &DummySort) -> Result<DummyDecl> {
        Ok(self.intern_decl(DeclInfo {
            name: name.to_string(),
            domain: domain.to_vec(),
            range: range.clone(),
        }))
    }

    fn mk_app(&self, decl: &DummyDecl, args: &[DummyTerm]) -> Result<DummyTerm> {
        let info = self.decl_info(decl)?;
        if info.domain.len() != args.len() {
            return Err(SolverError::InvalidArgument(format!(
                "{} expects {} arguments, got {}",
                info.name,
                info.domain.len(),
                args.len()
            )));
        }
        for (arg, sort) in args.iter().zip(&info.domain) {
            self.expect(arg, sort)?;
        }
        Ok(self.intern(Op::Apply(*decl), args.to_vec(), info.range))
    }

    fn app_decl(&self, term: &DummyTerm) -> Result<Option<DummyDecl>> {
        Ok(match self.node(term)?.op {
            Op::Apply(decl) => Some(decl),
            _ => None,
        })
    }

    fn dump(&self, term: &DummyTerm) -> Result<String> {
        let mut out = String::new();
        self.render(term, &mut out)?;
        Ok(out)
    }

    fn requires_reference_counting(&self) -> bool {
        self.reference_counting
    }

    fn inc_ref(&self, term: &DummyTerm) {
        if self.reference_counting {
            *self.ref_counts.borrow_mut().entry(*term).or_insert(0) += 1;
        }
    }

    fn dec_ref(&self, term: &DummyTerm) {
        if !self.reference_counting {
            return;
        }
        let mut counts = self.ref_counts.borrow_mut();
        match counts.get_mut(term) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(term);
            }
            None => warn!(?term, "reference count underflow"),
        }
    }

    fn bool_converter(&self) -> &dyn GeneralBoolConverter<DummySort, DummyTerm> {
        self
    }

    fn try_get_numeral_converter(&self) -> Option<&dyn GeneralNumeralConverter<DummySort, DummyTerm>> {
        Some(self)
    }

    fn try_get_bv_converter(&self) -> Option<&dyn GeneralBvConverter<DummySort, DummyTerm>> {
        Some(self)
    }

    fn try_get_array_converter(&self) -> Option<&dyn GeneralArrayConverter<DummySort, DummyTerm>> {
        Some(self)
    }

    fn try_get_quantifier_converter(
        &self,
    ) -> Option<&dyn GeneralQuantifierConverter<DummySort, DummyTerm>> {
        Some(self)
    }
}

impl GeneralBoolConverter<DummySort, DummyTerm> for DummyContext {
    fn mk_smt_bool(&self, val: bool) -> Result<DummyTerm> {
        let op = if val { Op::True } else { Op::False };
        Ok(self.intern(op, Vec::new(), DummySort::Bool))
    }

    fn mk_not(&self, term: &DummyTerm) -> Result<DummyTerm> {
        self.connective(Op::Not, &[*term])
    }

    fn mk_and(&self, terms: &[DummyTerm]) -> Result<DummyTerm> {
        match terms {
            [] => self.mk_smt_bool(true),
            [single] => Ok(*single),
            _ => self.connective(Op::And, terms),
        }
    }

    fn mk_or(&self, terms: &[DummyTerm]) -> Result<DummyTerm> {
        match terms {
            [] => self.mk_smt_bool(false),
            [single] => Ok(*single),
            _ => self.connective(Op::Or, terms),
        }
    }

    fn mk_iff(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.connective(Op::Iff, &[*term1, *term2])
    }

    fn mk_implies(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.connective(Op::Implies, &[*term1, *term2])
    }

    fn mk_ite(&self, cond: &DummyTerm, then_term: &DummyTerm, else_term: &DummyTerm) -> Result<DummyTerm> {
        self.expect(cond, &DummySort::Bool)?;
        let sort = self.same_sort(&[*then_term, *else_term])?;
        Ok(self.intern(Op::Ite, vec![*cond, *then_term, *else_term], sort))
    }

    fn mk_eq(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.same_sort(&[*term1, *term2])?;
        Ok(self.intern(Op::Eq, vec![*term1, *term2], DummySort::Bool))
    }

    fn mk_distinct(&self, terms: &[DummyTerm]) -> Result<DummyTerm> {
        if terms.len() < 2 {
            return Err(SolverError::InvalidArgument(
                "distinct needs at least two arguments".to_string(),
            ));
        }
        self.same_sort(terms)?;
        Ok(self.intern(Op::Distinct, terms.to_vec(), DummySort::Bool))
    }
}

impl GeneralNumeralConverter<DummySort, DummyTerm> for DummyContext {
    fn mk_int_sort(&self) -> Result<DummySort> {
        Ok(DummySort::Int)
    }

    fn mk_real_sort(&self) -> Result<DummySort> {
        Ok(DummySort::Real)
    }

    fn mk_numeral(&self, value: &BigRational, sort: &DummySort) -> Result<DummyTerm> {
        match sort {
            DummySort::Int if value.is_integer() => {
                Ok(self.intern(Op::Int(value.to_integer()), Vec::new(), DummySort::Int))
            }
            DummySort::Int => Err(SolverError::InvalidArgument(format!(
                "{} is not an integer",
                value
            ))),
            DummySort::Real => Ok(self.intern(Op::Real(value.clone()), Vec::new(), DummySort::Real)),
            other => Err(mismatch(&DummySort::Real, other)),
        }
    }

    fn mk_add(&self, terms: &[DummyTerm]) -> Result<DummyTerm> {
        self.arith("+", terms)
    }

    fn mk_sub(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.arith("-", &[*term1, *term2])
    }

    fn mk_mul(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.arith("*", &[*term1, *term2])
    }

    fn mk_neg(&self, term: &DummyTerm) -> Result<DummyTerm> {
        self.arith("-", &[*term])
    }

    fn mk_div(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        match self.sort(term1)? {
            DummySort::Int => self.arith("div", &[*term1, *term2]),
            _ => self.arith("/", &[*term1, *term2]),
        }
    }

    fn mk_mod(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.expect(term1, &DummySort::Int)?;
        self.arith("mod", &[*term1, *term2])
    }

    fn mk_lt(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.comparison("<", term1, term2)
    }

    fn mk_le(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.comparison("<=", term1, term2)
    }

    fn mk_gt(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.comparison(">", term1, term2)
    }

    fn mk_ge(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.comparison(">=", term1, term2)
    }

    fn mk_to_real(&self, term: &DummyTerm) -> Result<DummyTerm> {
        self.expect(term, &DummySort::Int)?;
        Ok(self.intern(Op::Arith("to_real"), vec![*term], DummySort::Real))
    }
}

impl GeneralBvConverter<DummySort, DummyTerm> for DummyContext {
    fn mk_bv_sort(&self, size: u32) -> Result<DummySort> {
        if size == 0 {
            return Err(SolverError::InvalidArgument("bit-vector width must be positive".to_string()));
        }
        Ok(DummySort::Bv(size))
    }

    fn mk_bv_value(&self, value: &BigInt, size: u32) -> Result<DummyTerm> {
        let sort = self.mk_bv_sort(size)?;
        let modulus = BigInt::one() << size as usize;
        let normalized = ((value % &modulus) + &modulus) % &modulus;
        Ok(self.intern(Op::BvValue(normalized, size), Vec::new(), sort))
    }

    fn mk_bv_add(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvadd", &[*term1, *term2], false)
    }

    fn mk_bv_sub(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvsub", &[*term1, *term2], false)
    }

    fn mk_bv_mul(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvmul", &[*term1, *term2], false)
    }

    fn mk_bv_and(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvand", &[*term1, *term2], false)
    }

    fn mk_bv_or(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvor", &[*term1, *term2], false)
    }

    fn mk_bv_xor(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvxor", &[*term1, *term2], false)
    }

    fn mk_bv_not(&self, term: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvnot", &[*term], false)
    }

    fn mk_bv_neg(&self, term: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvneg", &[*term], false)
    }

    fn mk_bv_ult(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvult", &[*term1, *term2], true)
    }

    fn mk_bv_ule(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvule", &[*term1, *term2], true)
    }

    fn mk_bv_slt(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvslt", &[*term1, *term2], true)
    }

    fn mk_bv_sle(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        self.bv("bvsle", &[*term1, *term2], true)
    }

    fn mk_concat(&self, term1: &DummyTerm, term2: &DummyTerm) -> Result<DummyTerm> {
        let width = self.bv_width(term1)? + self.bv_width(term2)?;
        Ok(self.intern(Op::BvOp("concat"), vec![*term1, *term2], DummySort::Bv(width)))
    }

    fn mk_extract(&self, high: u32, low: u32, term: &DummyTerm) -> Result<DummyTerm> {
        let width = self.bv_width(term)?;
        if high < low || high >= width {
            return Err(SolverError::InvalidArgument(format!(
                "cannot extract [{}:{}] from a bit-vector of width {}",
                high, low, width
            )));
        }
        Ok(self.intern(Op::Extract(high, low), vec![*term], DummySort::Bv(high - low + 1)))
    }
}

impl GeneralArrayConverter<DummySort, DummyTerm> for DummyContext {
    fn mk_array_sort(&self, index: &DummySort, element: &DummySort) -> Result<DummySort> {
        Ok(DummySort::Array(Box::new(index.clone()), Box::new(element.clone())))
    }

    fn mk_select(&self, array: &DummyTerm, index: &DummyTerm) -> Result<DummyTerm> {
        match self.sort(array)? {
            DummySort::Array(index_sort, element_sort) => {
                self.expect(index, &index_sort)?;
                Ok(self.intern(Op::Select, vec![*array, *index], *element_sort))
            }
            other => Err(SolverError::UnsupportedOperator(format!(
                "select on {}",
                sort_type(&other)
            ))),
        }
    }

    fn mk_store(&self, array: &DummyTerm, index: &DummyTerm, value: &DummyTerm) -> Result<DummyTerm> {
        let sort = self.sort(array)?;
        match &sort {
            DummySort::Array(index_sort, element_sort) => {
                self.expect(index, index_sort)?;
                self.expect(value, element_sort)?;
                Ok(self.intern(Op::Store, vec![*array, *index, *value], sort.clone()))
            }
            other => Err(SolverError::UnsupportedOperator(format!(
                "store on {}",
                sort_type(other)
            ))),
        }
    }

    fn mk_const_array(&self, index: &DummySort, value: &DummyTerm) -> Result<DummyTerm> {
        let sort = self.mk_array_sort(index, &self.sort(value)?)?;
        Ok(self.intern(Op::ConstArray, vec![*value], sort))
    }
}

impl GeneralQuantifierConverter<DummySort, DummyTerm> for DummyContext {
    fn mk_quantifier(&self, quantifier: Quantifier, bound: &[DummyTerm], body: &DummyTerm) -> Result<DummyTerm> {
        self.expect(body, &DummySort::Bool)?;
        if bound.is_empty() {
            return Ok(*body);
        }
        let mut vars = Vec::with_capacity(bound.len());
        let mut indices = FxHashMap::default();
        for (position, var) in bound.iter().enumerate() {
            let node = self.node(var)?;
            match node.op {
                Op::Apply(decl) if node.args.is_empty() => {
                    vars.push((self.decl_info(&decl)?.name, node.sort));
                }
                _ => {
                    return Err(SolverError::InvalidArgument(
                        "only constants can be bound".to_string(),
                    ))
                }
            }
            indices.insert(*var, (bound.len() - 1 - position) as u32);
        }
        let body = self.abstract_bound(*body, &indices, 0, &mut FxHashMap::default())?;
        Ok(self.intern(Op::Quantifier(quantifier, vars), vec![body], DummySort::Bool))
    }

    fn eliminate_quantifiers(&self, _term: &DummyTerm) -> Result<DummyTerm> {
        Err(SolverError::UnsupportedOperator("quantifier elimination".to_string()))
    }
}

#[derive(Default)]
struct Frame {
    assertions: Vec<DummyTerm>,
    declared: FxHashSet<DummyDecl>,
}

/// A session that answers only when the assertions fold to constants.
/// Declarations are scoped: popping a frame forgets what was declared in it.
pub struct DummySolver {
    context: Rc<DummyContext>,
    frames: RefCell<Vec<Frame>>,
    abbreviations: RefCell<Vec<DummyTerm>>,
    last_result: Cell<Option<SolverResult>>,
    reason_unknown: RefCell<Option<String>>,
    interrupted: Arc<AtomicBool>,
}

impl DummySolver {
    pub fn new(context: Rc<DummyContext>, _options: &Options) -> Self {
        Self {
            context,
            frames: RefCell::new(vec![Frame::default()]),
            abbreviations: RefCell::new(Vec::new()),
            last_result: Cell::new(None),
            reason_unknown: RefCell::new(None),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn abbreviations(&self) -> Vec<DummyTerm> {
        self.abbreviations.borrow().clone()
    }

    pub fn is_declared(&self, decl: &DummyDecl) -> bool {
        self.frames
            .borrow()
            .iter()
            .any(|frame| frame.declared.contains(decl))
    }

    fn model_available(&self) -> Result<()> {
        match self.last_result.get() {
            Some(SolverResult::Sat) => Ok(()),
            _ => Err(SolverError::IllegalState(
                "no model is available, the last check was not satisfiable".to_string(),
            )),
        }
    }
}

impl GeneralSolver for DummySolver {
    type Converter = DummyContext;

    fn converter(&self) -> &Rc<DummyContext> {
        &self.context
    }

    fn assert(&self, term: &DummyTerm) -> Result<()> {
        self.context.expect(term, &DummySort::Bool)?;
        let mut symbols = FxHashSet::default();
        self.context.symbols_of(term, &mut symbols)?;
        for decl in &symbols {
            if !self.is_declared(decl) {
                return Err(SolverError::Solver(format!(
                    "unknown constant {}",
                    self.context.decl_info(decl)?.name
                )));
            }
        }
        self.last_result.set(None);
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.assertions.push(*term);
        }
        Ok(())
    }

    fn push(&self) -> Result<()> {
        self.frames.borrow_mut().push(Frame::default());
        self.last_result.set(None);
        Ok(())
    }

    fn pop(&self) -> Result<()> {
        let mut frames = self.frames.borrow_mut();
        if frames.len() == 1 {
            return Err(SolverError::IllegalState("pop on an empty solver stack".to_string()));
        }
        frames.pop();
        self.last_result.set(None);
        Ok(())
    }

    fn check_sat(&self) -> Result<SolverResult> {
        if self.interrupted.swap(false, Ordering::SeqCst) {
            *self.reason_unknown.borrow_mut() = Some("canceled".to_string());
            self.last_result.set(Some(SolverResult::Unknown));
            return Ok(SolverResult::Unknown);
        }
        let mut memo = FxHashMap::default();
        let mut all_true = true;
        let mut result = None;
        for frame in self.frames.borrow().iter() {
            for assertion in &frame.assertions {
                match self.context.fold(assertion, false, &mut memo)? {
                    Some(Value::Bool(false)) => result = Some(SolverResult::Unsat),
                    Some(Value::Bool(true)) => {}
                    _ => all_true = false,
                }
            }
        }
        let result = result.unwrap_or(if all_true {
            SolverResult::Sat
        } else {
            SolverResult::Unknown
        });
        *self.reason_unknown.borrow_mut() =
            (result == SolverResult::Unknown).then(|| "incomplete".to_string());
        debug!(%result, "dummy check");
        self.last_result.set(Some(result));
        Ok(result)
    }

    fn reason_unknown(&self) -> Option<String> {
        self.reason_unknown.borrow().clone()
    }

    fn eval(&self, term: &DummyTerm, completion: bool) -> Result<Option<DummyTerm>> {
        self.model_available()?;
        let sort = self.context.sort(term)?;
        match self.context.fold(term, completion, &mut FxHashMap::default())? {
            Some(value) => Ok(Some(self.context.literal(value, &sort)?)),
            None => Ok(None),
        }
    }

    fn model_assignments(&self) -> Result<Vec<(DummyTerm, DummyTerm)>> {
        self.model_available()?;
        let mut decls: Vec<DummyDecl> = self
            .frames
            .borrow()
            .iter()
            .flat_map(|frame| frame.declared.iter().copied())
            .collect();
        decls.sort();
        let mut assignments = Vec::new();
        for decl in decls {
            let info = self.context.decl_info(&decl)?;
            if !info.domain.is_empty() {
                continue;
            }
            let constant = self.context.mk_app(&decl, &[])?;
            if let Some(value) = self.context.default_value(&info.range) {
                assignments.push((constant, self.context.literal(value, &info.range)?));
            }
        }
        Ok(assignments)
    }

    fn declare(&self, symbol: &Symbol<DummyTerm, DummyDecl>) -> Result<()> {
        let decl = match symbol {
            Symbol::Boolean(term) | Symbol::Numeric(term) => self
                .context
                .app_decl(term)?
                .ok_or_else(|| SolverError::InvalidArgument("only constants can be declared".to_string()))?,
            Symbol::Function(decl) => *decl,
        };
        if let Some(frame) = self.frames.borrow_mut().last_mut() {
            frame.declared.insert(decl);
        }
        Ok(())
    }

    fn forgets_declarations_on_pop(&self) -> bool {
        true
    }

    fn register_abbreviations(&self, shared: &[DummyTerm]) -> Result<()> {
        self.abbreviations.borrow_mut().extend_from_slice(shared);
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        *self.frames.borrow_mut() = vec![Frame::default()];
        self.last_result.set(None);
        Ok(())
    }
}

pub struct DummyInterrupter {
    interrupted: Arc<AtomicBool>,
}

impl Interrupter for DummyInterrupter {
    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct DummyFactory {
    contexts: Vec<Rc<DummyContext>>,
    reference_counting: bool,
}

impl DummyFactory {
    pub fn with_reference_counting() -> Self {
        Self {
            contexts: Vec::new(),
            reference_counting: true,
        }
    }
}

impl Factory for DummyFactory {
    type Converter = DummyContext;
    type Solver = DummySolver;
    type Interrupter = DummyInterrupter;

    fn new_context(&mut self, _options: &Options) -> Result<Rc<DummyContext>> {
        let context = Rc::new(DummyContext::with_reference_counting(self.reference_counting));
        self.contexts.push(context.clone());
        Ok(context)
    }

    fn delete_context(&mut self, context: Rc<DummyContext>) {
        self.contexts.retain(|known| !Rc::ptr_eq(known, &context));
    }

    fn new_solver(&mut self, context: &Rc<DummyContext>, options: &Options) -> Result<DummySolver> {
        Ok(DummySolver::new(context.clone(), options))
    }

    fn new_interrupter(&self, solver: &DummySolver) -> DummyInterrupter {
        DummyInterrupter {
            interrupted: solver.interrupted.clone(),
        }
    }
}
