//! This module contains the symbolic value representation used by the
//! executor: fully-known words, opaque environment variables, and expression
//! trees built over both.

use std::sync::Arc;

use ethnum::U256;

/// Where a symbolic variable got its value from.
///
/// The origin is what the detectors key on: a value rooted in `CallData`,
/// `Caller` or `CallValue` is attacker influenced, while one rooted in
/// `Timestamp` or `BlockNumber` is miner influenced.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum VarOrigin {
    /// A word loaded from calldata (`CALLDATALOAD`).
    CallData,

    /// The length of calldata (`CALLDATASIZE`).
    CallDataSize,

    /// The message sender (`CALLER`).
    Caller,

    /// The transaction originator (`ORIGIN`).
    TxOrigin,

    /// The wei sent with the call (`CALLVALUE`).
    CallValue,

    /// The current block timestamp (`TIMESTAMP`).
    Timestamp,

    /// The current block number (`NUMBER`).
    BlockNumber,

    /// Block environment data other than time and height (`COINBASE`,
    /// `PREVRANDAO`, `GASLIMIT`, `BASEFEE`, `BLOCKHASH`, `CHAINID`).
    BlockEnvironment,

    /// An account balance (`BALANCE`, `SELFBALANCE`).
    Balance,

    /// Remaining gas (`GAS`).
    Gas,

    /// The contract's own address or code data (`ADDRESS`, `CODESIZE`,
    /// `EXTCODESIZE`, `EXTCODEHASH`, `RETURNDATASIZE`).
    AccountData,

    /// A read of memory whose contents the executor could not track.
    Memory,

    /// The success word returned by an external call.
    CallResult,

    /// The address produced by `CREATE` or `CREATE2`.
    Create,

    /// A value the executor had to invent to keep going, such as the result
    /// of an unmodelled instruction.
    Fresh,
}

/// A symbolic variable: an opaque word identified by its origin and a
/// per-execution index.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Var {
    pub origin: VarOrigin,
    pub index:  u32,
}

impl Var {
    #[must_use]
    pub fn new(origin: VarOrigin, index: u32) -> Self {
        Self { origin, index }
    }
}

/// The operations that can appear at the interior nodes of a symbolic
/// expression tree.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Op {
    Add,
    Mul,
    Sub,
    Div,
    SDiv,
    Mod,
    SMod,
    AddMod,
    MulMod,
    Exp,
    SignExtend,
    Lt,
    Gt,
    SLt,
    SGt,
    Eq,
    IsZero,
    And,
    Or,
    Xor,
    Not,
    Byte,
    Shl,
    Shr,
    Sar,

    /// A Keccak-256 hash over memory, with the hashed words as operands. The
    /// storage analyser recognises this as the mapping-slot shape.
    Keccak,

    /// A read of the storage slot given by the single operand.
    SLoad,
}

/// A symbolic EVM word.
///
/// Values are immutable and share their subtrees; cloning is cheap.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum SymbolicValue {
    /// A fully-known word.
    Concrete(U256),

    /// An opaque word from the environment.
    Symbolic(Var),

    /// An operation over other symbolic words.
    Expr { op: Op, args: Arc<[SymbolicValue]> },
}

impl SymbolicValue {
    /// Constructs a concrete value from a word.
    #[must_use]
    pub fn concrete(word: impl Into<U256>) -> Self {
        Self::Concrete(word.into())
    }

    /// Constructs an opaque variable value.
    #[must_use]
    pub fn var(origin: VarOrigin, index: u32) -> Self {
        Self::Symbolic(Var::new(origin, index))
    }

    /// Constructs a unary expression, folding to a concrete result when the
    /// operand is concrete.
    #[must_use]
    pub fn unary(op: Op, value: Self) -> Self {
        if let Self::Concrete(a) = &value {
            if let Some(folded) = fold_unary(op, *a) {
                return Self::Concrete(folded);
            }
        }
        Self::Expr {
            op,
            args: Arc::from(vec![value]),
        }
    }

    /// Constructs a binary expression, folding to a concrete result when both
    /// operands are concrete.
    #[must_use]
    pub fn binary(op: Op, left: Self, right: Self) -> Self {
        if let (Self::Concrete(a), Self::Concrete(b)) = (&left, &right) {
            if let Some(folded) = fold_binary(op, *a, *b) {
                return Self::Concrete(folded);
            }
        }
        Self::Expr {
            op,
            args: Arc::from(vec![left, right]),
        }
    }

    /// Constructs a ternary expression (`ADDMOD` and `MULMOD`).
    #[must_use]
    pub fn ternary(op: Op, a: Self, b: Self, c: Self) -> Self {
        if let (Self::Concrete(x), Self::Concrete(y), Self::Concrete(z)) = (&a, &b, &c) {
            if let Some(folded) = fold_ternary(op, *x, *y, *z) {
                return Self::Concrete(folded);
            }
        }
        Self::Expr {
            op,
            args: Arc::from(vec![a, b, c]),
        }
    }

    /// Constructs an expression over an arbitrary number of operands. Used
    /// for `Keccak`, whose arity is the number of hashed words.
    #[must_use]
    pub fn expr(op: Op, args: Vec<Self>) -> Self {
        Self::Expr {
            op,
            args: Arc::from(args),
        }
    }

    /// Gets the concrete word this value denotes, if it is fully known.
    #[must_use]
    pub fn as_concrete(&self) -> Option<U256> {
        match self {
            Self::Concrete(word) => Some(*word),
            _ => None,
        }
    }

    /// Checks whether any variable in this value's tree satisfies the
    /// provided predicate.
    pub fn references(&self, predicate: &impl Fn(&Var) -> bool) -> bool {
        match self {
            Self::Concrete(_) => false,
            Self::Symbolic(var) => predicate(var),
            Self::Expr { args, .. } => args.iter().any(|arg| arg.references(predicate)),
        }
    }

    /// Checks whether this value depends on data an external caller controls.
    #[must_use]
    pub fn is_attacker_influenced(&self) -> bool {
        self.references(&|var| {
            matches!(
                var.origin,
                VarOrigin::CallData
                    | VarOrigin::CallDataSize
                    | VarOrigin::Caller
                    | VarOrigin::TxOrigin
                    | VarOrigin::CallValue
            )
        })
    }

    /// Checks whether this value depends on block data a miner influences.
    #[must_use]
    pub fn is_miner_influenced(&self) -> bool {
        self.references(&|var| {
            matches!(var.origin, VarOrigin::Timestamp | VarOrigin::BlockNumber)
        })
    }

    /// Checks whether this value is, or contains, a `Keccak` expression.
    #[must_use]
    pub fn contains_keccak(&self) -> bool {
        match self {
            Self::Expr { op: Op::Keccak, .. } => true,
            Self::Expr { args, .. } => args.iter().any(Self::contains_keccak),
            _ => false,
        }
    }
}

/// The canonical truth words.
const TRUE_WORD: U256 = U256::ONE;
const FALSE_WORD: U256 = U256::ZERO;

fn bool_word(value: bool) -> U256 {
    if value {
        TRUE_WORD
    } else {
        FALSE_WORD
    }
}

/// Interprets a word as a two's-complement signed value for the signed
/// comparison fold.
fn is_negative(word: U256) -> bool {
    word >> 255 != U256::ZERO
}

fn fold_unary(op: Op, a: U256) -> Option<U256> {
    let result = match op {
        Op::IsZero => bool_word(a == U256::ZERO),
        Op::Not => !a,
        _ => return None,
    };
    Some(result)
}

fn fold_binary(op: Op, a: U256, b: U256) -> Option<U256> {
    let result = match op {
        Op::Add => a.wrapping_add(b),
        Op::Mul => a.wrapping_mul(b),
        Op::Sub => a.wrapping_sub(b),
        Op::Div => {
            if b == U256::ZERO {
                U256::ZERO
            } else {
                a / b
            }
        }
        Op::Mod => {
            if b == U256::ZERO {
                U256::ZERO
            } else {
                a % b
            }
        }
        Op::Lt => bool_word(a < b),
        Op::Gt => bool_word(a > b),
        Op::SLt => bool_word(match (is_negative(a), is_negative(b)) {
            (true, false) => true,
            (false, true) => false,
            _ => a < b,
        }),
        Op::SGt => bool_word(match (is_negative(a), is_negative(b)) {
            (true, false) => false,
            (false, true) => true,
            _ => a > b,
        }),
        Op::Eq => bool_word(a == b),
        Op::And => a & b,
        Op::Or => a | b,
        Op::Xor => a ^ b,
        Op::Byte => {
            if a < U256::from(32u8) {
                (b >> (8 * (31 - a.as_u32()))) & U256::from(0xffu8)
            } else {
                U256::ZERO
            }
        }
        Op::Shl => {
            if a >= U256::from(256u16) {
                U256::ZERO
            } else {
                b << a.as_u32()
            }
        }
        Op::Shr => {
            if a >= U256::from(256u16) {
                U256::ZERO
            } else {
                b >> a.as_u32()
            }
        }
        Op::Exp => {
            // Folded only when cheap; a symbolic-looking result is fine for
            // huge exponents.
            if b <= U256::from(256u16) {
                let mut acc = U256::ONE;
                for _ in 0..b.as_u32() {
                    acc = acc.wrapping_mul(a);
                }
                acc
            } else {
                return None;
            }
        }
        _ => return None,
    };
    Some(result)
}

fn fold_ternary(op: Op, a: U256, b: U256, n: U256) -> Option<U256> {
    if n == U256::ZERO {
        return Some(U256::ZERO);
    }
    let result = match op {
        // Folding modular arithmetic exactly would need 512-bit
        // intermediates; fold only when the operands cannot overflow.
        Op::AddMod => a.checked_add(b)? % n,
        Op::MulMod => a.checked_mul(b)? % n,
        _ => return None,
    };
    Some(result)
}
