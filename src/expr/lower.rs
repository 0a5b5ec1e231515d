use polars::prelude::{
    Column, DataType, Expr, Field, Float64Chunked, IntoColumn, IntoSeries, NULL, PlSmallStr,
    QuantileMethod, RankMethod, RankOptions, RollingOptionsFixedWindow, col, lit, when,
};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::ExpressionError,
    expr::parser::{Ast, BinaryOp, UnaryOp},
    schema::ReservedCol,
};

/// Functions understood by the built-in engine.
///
/// Time-series functions operate per instrument in date order. `cs_*` functions
/// operate across instruments within one date. `all_*` functions operate over the
/// whole table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Builtin {
    // === Time series ===
    /// `shift(x, n)`: value `n` rows earlier (negative `n` looks ahead).
    Shift,
    /// `delta(x, n)`: `x - shift(x, n)`.
    Delta,
    /// `mean(x, n)`: rolling mean over `n` rows.
    Mean,
    /// `sum(x, n)`: rolling sum over `n` rows.
    Sum,
    /// `std(x, n)`: rolling sample standard deviation over `n` rows.
    Std,
    /// `ts_min(x, n)`: rolling minimum over `n` rows.
    TsMin,
    /// `ts_max(x, n)`: rolling maximum over `n` rows.
    TsMax,

    // === Element-wise ===
    Abs,
    Log,
    Exp,
    Sqrt,
    Sign,
    /// `clip(x, lo, hi)`
    Clip,
    /// `where(cond, a, b)`
    Where,
    /// `isnan(x)`: true for missing and NaN values.
    Isnan,

    // === Cross-sectional ===
    /// `cs_mean(x)`: mean of `x` across instruments on the same date.
    CsMean,
    /// `cs_rank(x)`: percentile rank in `(0, 1]` across instruments on the same date.
    CsRank,

    // === Whole table ===
    /// `all_quantile(x, q)`
    AllQuantile,
    /// `all_wbins(x, n)`: equal-width bucket index in `0..n`.
    AllWbins,
    /// `all_qbins(x, n)`: equal-frequency bucket index in `0..n`.
    AllQbins,
}

impl Builtin {
    pub fn arity(&self) -> usize {
        match self {
            Self::Abs
            | Self::Log
            | Self::Exp
            | Self::Sqrt
            | Self::Sign
            | Self::Isnan
            | Self::CsMean
            | Self::CsRank => 1,
            Self::Shift
            | Self::Delta
            | Self::Mean
            | Self::Sum
            | Self::Std
            | Self::TsMin
            | Self::TsMax
            | Self::AllQuantile
            | Self::AllWbins
            | Self::AllQbins => 2,
            Self::Clip | Self::Where => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    fn resolve(name: &str, found: usize) -> Result<Self, ExpressionError> {
        let builtin = name
            .parse::<Builtin>()
            .map_err(|_| ExpressionError::UnknownFunction(name.to_string()))?;
        if builtin.arity() != found {
            return Err(ExpressionError::Arity {
                name: name.to_string(),
                expected: builtin.arity(),
                found,
            });
        }
        Ok(builtin)
    }
}

/// Checks that every call names a built-in with the right number of arguments.
pub(crate) fn check_calls(ast: &Ast) -> Result<(), ExpressionError> {
    let mut result = Ok(());
    ast.walk(&mut |node| {
        if result.is_ok()
            && let Ast::Call { name, args } = node
        {
            result = Builtin::resolve(name, args.len()).map(|_| ());
        }
    });
    result
}

/// Columns of the evaluated table the lowering may rely on.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LowerCtx {
    /// Rows are grouped by `instrument` and ordered by `date` within each group.
    pub grouped: bool,
    pub has_date: bool,
}

pub(crate) fn lower(ast: &Ast, ctx: &LowerCtx) -> Result<Expr, ExpressionError> {
    Ok(lower_node(ast, ctx)?.cast(DataType::Float64))
}

fn lower_node(ast: &Ast, ctx: &LowerCtx) -> Result<Expr, ExpressionError> {
    match ast {
        Ast::Number(v) => Ok(lit(*v)),
        Ast::Bool(b) => Ok(lit(*b)),
        Ast::Var(name) => {
            // NaN in the history means missing
            let x = col(name.as_str()).cast(DataType::Float64);
            Ok(when(x.clone().is_nan()).then(null_f64()).otherwise(x))
        }
        Ast::Unary { op, operand } => {
            let x = lower_node(operand, ctx)?;
            Ok(match op {
                UnaryOp::Neg => lit(0.0) - x,
                UnaryOp::Not => x.not(),
            })
        }
        Ast::Binary { op, lhs, rhs } => {
            let l = lower_node(lhs, ctx)?;
            let r = lower_node(rhs, ctx)?;
            Ok(match op {
                BinaryOp::Add => l + r,
                BinaryOp::Sub => l - r,
                BinaryOp::Mul => l * r,
                BinaryOp::Div => l / r,
                BinaryOp::Rem => l % r,
                // A comparison with a missing value is false, and `!=` is true.
                BinaryOp::Eq => l.eq(r).fill_null(lit(false)),
                BinaryOp::NotEq => l.neq(r).fill_null(lit(true)),
                BinaryOp::Lt => l.lt(r).fill_null(lit(false)),
                BinaryOp::LtEq => l.lt_eq(r).fill_null(lit(false)),
                BinaryOp::Gt => l.gt(r).fill_null(lit(false)),
                BinaryOp::GtEq => l.gt_eq(r).fill_null(lit(false)),
                BinaryOp::And => l.and(r),
                BinaryOp::Or => l.or(r),
            })
        }
        Ast::Call { name, args } => lower_call(Builtin::resolve(name, args.len())?, args, ctx),
    }
}

fn lower_call(func: Builtin, args: &[Ast], ctx: &LowerCtx) -> Result<Expr, ExpressionError> {
    let x = lower_node(&args[0], ctx)?;

    let expr = match func {
        Builtin::Shift => {
            let n = const_int(func, &args[1], "n")?;
            shift_within_instrument(x, n, ctx)
        }
        Builtin::Delta => {
            let n = const_int(func, &args[1], "n")?;
            x.clone() - shift_within_instrument(x, n, ctx)
        }
        Builtin::Mean | Builtin::Sum | Builtin::Std | Builtin::TsMin | Builtin::TsMax => {
            let window = window_size(func, &args[1])?;
            let options = RollingOptionsFixedWindow {
                window_size: window,
                min_periods: window,
                weights: None,
                center: false,
                fn_params: None,
            };
            let rolled = match func {
                Builtin::Mean => x.rolling_mean(options),
                Builtin::Sum => x.rolling_sum(options),
                Builtin::Std => x.rolling_std(options),
                Builtin::TsMin => x.rolling_min(options),
                _ => x.rolling_max(options),
            };
            mask_group_boundary(rolled, window as i64 - 1, ctx)
        }
        Builtin::Abs => x.abs(),
        Builtin::Sqrt => x.sqrt(),
        Builtin::Log => map_float(x, f64::ln),
        Builtin::Exp => map_float(x, f64::exp),
        Builtin::Sign => map_float(x, sign),
        Builtin::Clip => {
            let lo = lower_node(&args[1], ctx)?;
            let hi = lower_node(&args[2], ctx)?;
            when(x.clone().lt(lo.clone()))
                .then(lo)
                .otherwise(when(x.clone().gt(hi.clone())).then(hi).otherwise(x))
        }
        Builtin::Where => {
            let a = lower_node(&args[1], ctx)?;
            let b = lower_node(&args[2], ctx)?;
            when(x).then(a).otherwise(b)
        }
        Builtin::Isnan => {
            let x = x.cast(DataType::Float64);
            x.clone().is_null().or(x.is_nan())
        }
        Builtin::CsMean => {
            require_date(func, ctx)?;
            x.mean().over([col(ReservedCol::Date)])
        }
        Builtin::CsRank => {
            require_date(func, ctx)?;
            let rank = x
                .clone()
                .rank(
                    RankOptions {
                        method: RankMethod::Average,
                        descending: false,
                    },
                    None,
                )
                .cast(DataType::Float64);
            (rank / x.count().cast(DataType::Float64)).over([col(ReservedCol::Date)])
        }
        Builtin::AllQuantile => {
            let q = const_value(func, &args[1], "q")?;
            if !(0.0..=1.0).contains(&q) {
                return Err(ExpressionError::InvalidArgument {
                    name: func.to_string(),
                    msg: format!("quantile must be within [0, 1], got {q}"),
                });
            }
            x.quantile(lit(q), QuantileMethod::Linear)
        }
        Builtin::AllWbins => {
            let n = bucket_count(func, &args[1])?;
            let lo = x.clone().min();
            let width = x.clone().max() - lo.clone();
            let raw = ((x.clone() - lo) / width.clone() * lit(n)).floor();
            when(width.eq(lit(0.0)).and(x.is_not_null()))
                .then(lit(0.0))
                .otherwise(when(raw.clone().gt_eq(lit(n))).then(lit(n - 1.0)).otherwise(raw))
        }
        Builtin::AllQbins => {
            let n = bucket_count(func, &args[1])?;
            let rank = x
                .clone()
                .rank(
                    RankOptions {
                        method: RankMethod::Average,
                        descending: false,
                    },
                    None,
                )
                .cast(DataType::Float64);
            ((rank - lit(1.0)) * lit(n) / x.count().cast(DataType::Float64)).floor()
        }
    };
    Ok(expr)
}

// ================================================================================================
// Helper Functions
// ================================================================================================

fn null_f64() -> Expr {
    lit(NULL).cast(DataType::Float64)
}

/// Shifts `x` by `n` rows and nulls out values that crossed into another instrument.
fn shift_within_instrument(x: Expr, n: i64, ctx: &LowerCtx) -> Expr {
    if n == 0 {
        return x;
    }
    mask_group_boundary(x.shift(lit(n)), n, ctx)
}

/// Keeps `expr` only where the row `offset` rows away belongs to the same instrument.
///
/// Requires rows to be grouped by instrument; negative offsets look ahead.
fn mask_group_boundary(expr: Expr, offset: i64, ctx: &LowerCtx) -> Expr {
    if !ctx.grouped || offset == 0 {
        return expr;
    }
    let instrument = col(ReservedCol::Instrument);
    when(instrument.clone().shift(lit(offset)).eq(instrument))
        .then(expr)
        .otherwise(null_f64())
}

fn map_float(x: Expr, f: fn(f64) -> f64) -> Expr {
    x.map(
        move |c: Column| {
            let values = c.cast(&DataType::Float64)?;
            let out = values
                .f64()?
                .into_iter()
                .map(|v| v.map(f))
                .collect::<Float64Chunked>()
                .with_name(c.name().clone());
            Ok(out.into_series().into_column())
        },
        |_, _| {
            Ok(Field {
                name: PlSmallStr::from_static("udf"),
                dtype: DataType::Float64,
            })
        },
    )
}

fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        // 0.0 stays 0.0, NaN stays NaN
        v
    }
}

fn require_date(func: Builtin, ctx: &LowerCtx) -> Result<(), ExpressionError> {
    if ctx.has_date {
        Ok(())
    } else {
        Err(ExpressionError::Evaluation(format!(
            "'{func}' requires a '{}' column",
            ReservedCol::Date
        )))
    }
}

fn const_value(func: Builtin, arg: &Ast, arg_name: &str) -> Result<f64, ExpressionError> {
    arg.const_value()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ExpressionError::NonConstant {
            name: func.to_string(),
            arg: arg_name.to_string(),
        })
}

fn const_int(func: Builtin, arg: &Ast, arg_name: &str) -> Result<i64, ExpressionError> {
    let v = const_value(func, arg, arg_name)?;
    if v.fract() != 0.0 {
        return Err(ExpressionError::InvalidArgument {
            name: func.to_string(),
            msg: format!("'{arg_name}' must be an integer, got {v}"),
        });
    }
    Ok(v as i64)
}

fn window_size(func: Builtin, arg: &Ast) -> Result<usize, ExpressionError> {
    let n = const_int(func, arg, "n")?;
    if n < 1 {
        return Err(ExpressionError::InvalidArgument {
            name: func.to_string(),
            msg: format!("window must be at least 1, got {n}"),
        });
    }
    Ok(n as usize)
}

fn bucket_count(func: Builtin, arg: &Ast) -> Result<f64, ExpressionError> {
    Ok(window_size(func, arg)? as f64)
}
