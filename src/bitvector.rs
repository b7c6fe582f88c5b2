use num_bigint::BigInt;
use std::rc::Rc;

use crate::creator::{BoolOf, FormulaCreator, FormulaOf};
use crate::error::{Result, SolverError};
use crate::generalized::{GeneralBvConverter, GeneralConverter};
use crate::term::FormulaType;

pub struct BitvectorFormulaManager<C: GeneralConverter> {
    creator: Rc<FormulaCreator<C>>,
}

impl<C: GeneralConverter> Clone for BitvectorFormulaManager<C> {
    fn clone(&self) -> Self {
        Self {
            creator: self.creator.clone(),
        }
    }
}

macro_rules! bv_binary_term {
    ($func_name:ident, $native:ident) => {
        pub fn $func_name(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<FormulaOf<C>> {
            let (width, term1, term2) = self.same_width(formula1, formula2)?;
            let term = self.native()?.$native(&term1, &term2)?;
            self.creator.encapsulate(&FormulaType::Bitvector(width), term)
        }
    };
}

impl<C: GeneralConverter> BitvectorFormulaManager<C> {
    pub fn new(creator: Rc<FormulaCreator<C>>) -> Self {
        Self { creator }
    }

    fn native(&self) -> Result<&dyn GeneralBvConverter<C::Sort, C::Term>> {
        self.creator
            .converter()
            .try_get_bv_converter()
            .ok_or_else(|| SolverError::UnsupportedTheory("bit-vectors".to_string()))
    }

    fn width(&self, formula: &FormulaOf<C>) -> Result<u32> {
        formula
            .formula_type()
            .try_get_bv_size()
            .ok_or_else(|| SolverError::type_mismatch(&FormulaType::Bitvector(1), formula.formula_type()))
    }

    fn same_width(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<(u32, C::Term, C::Term)> {
        let width = self.width(formula1)?;
        if self.width(formula2)? != width {
            return Err(SolverError::type_mismatch(
                formula1.formula_type(),
                formula2.formula_type(),
            ));
        }
        Ok((
            width,
            self.creator.extract(formula1)?,
            self.creator.extract(formula2)?,
        ))
    }

    /// `value` is taken modulo `2^width`.
    pub fn make_bitvector(&self, width: u32, value: &BigInt) -> Result<FormulaOf<C>> {
        let term = self.native()?.mk_bv_value(value, width)?;
        self.creator.encapsulate(&FormulaType::Bitvector(width), term)
    }

    pub fn make_variable(&self, width: u32, name: &str) -> Result<FormulaOf<C>> {
        let formula_type = FormulaType::Bitvector(width);
        let term = self.creator.make_variable(&formula_type, name)?;
        self.creator.encapsulate(&formula_type, term)
    }

    pub fn get_length(&self, formula: &FormulaOf<C>) -> Result<u32> {
        self.width(formula)
    }

    bv_binary_term!(add, mk_bv_add);
    bv_binary_term!(subtract, mk_bv_sub);
    bv_binary_term!(multiply, mk_bv_mul);
    bv_binary_term!(and, mk_bv_and);
    bv_binary_term!(or, mk_bv_or);
    bv_binary_term!(xor, mk_bv_xor);

    pub fn not(&self, formula: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        let width = self.width(formula)?;
        let term = self.native()?.mk_bv_not(&self.creator.extract(formula)?)?;
        self.creator.encapsulate(&FormulaType::Bitvector(width), term)
    }

    pub fn negate(&self, formula: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        let width = self.width(formula)?;
        let term = self.native()?.mk_bv_neg(&self.creator.extract(formula)?)?;
        self.creator.encapsulate(&FormulaType::Bitvector(width), term)
    }

    pub fn less_than(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>, signed: bool) -> Result<BoolOf<C>> {
        let (_, term1, term2) = self.same_width(formula1, formula2)?;
        let native = self.native()?;
        let term = if signed {
            native.mk_bv_slt(&term1, &term2)?
        } else {
            native.mk_bv_ult(&term1, &term2)?
        };
        self.creator.encapsulate_boolean(term)
    }

    pub fn less_or_equals(
        &self,
        formula1: &FormulaOf<C>,
        formula2: &FormulaOf<C>,
        signed: bool,
    ) -> Result<BoolOf<C>> {
        let (_, term1, term2) = self.same_width(formula1, formula2)?;
        let native = self.native()?;
        let term = if signed {
            native.mk_bv_sle(&term1, &term2)?
        } else {
            native.mk_bv_ule(&term1, &term2)?
        };
        self.creator.encapsulate_boolean(term)
    }

    pub fn greater_than(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>, signed: bool) -> Result<BoolOf<C>> {
        self.less_than(formula2, formula1, signed)
    }

    pub fn greater_or_equals(
        &self,
        formula1: &FormulaOf<C>,
        formula2: &FormulaOf<C>,
        signed: bool,
    ) -> Result<BoolOf<C>> {
        self.less_or_equals(formula2, formula1, signed)
    }

    pub fn equal(&self, formula1: &FormulaOf<C>, formula2: &FormulaOf<C>) -> Result<BoolOf<C>> {
        let (_, term1, term2) = self.same_width(formula1, formula2)?;
        let term = self.creator.converter().bool_converter().mk_eq(&term1, &term2)?;
        self.creator.encapsulate_boolean(term)
    }

    /// `prefix` ends up in the most significant bits.
    pub fn concat(&self, prefix: &FormulaOf<C>, suffix: &FormulaOf<C>) -> Result<FormulaOf<C>> {
        let width = self.width(prefix)? + self.width(suffix)?;
        let term = self
            .native()?
            .mk_concat(&self.creator.extract(prefix)?, &self.creator.extract(suffix)?)?;
        self.creator.encapsulate(&FormulaType::Bitvector(width), term)
    }

    /// Bits `high` down to `low`, both inclusive.
    pub fn extract(&self, formula: &FormulaOf<C>, high: u32, low: u32) -> Result<FormulaOf<C>> {
        let width = self.width(formula)?;
        if high < low || high >= width {
            return Err(SolverError::InvalidArgument(format!(
                "cannot extract [{}:{}] from {}",
                high,
                low,
                formula.formula_type()
            )));
        }
        let term = self
            .native()?
            .mk_extract(high, low, &self.creator.extract(formula)?)?;
        self.creator
            .encapsulate(&FormulaType::Bitvector(high - low + 1), term)
    }
}
