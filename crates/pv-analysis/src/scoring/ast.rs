//! Typed formula syntax tree.

/// Whitelisted functions callable from a formula.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Function {
    Abs,
    Min,
    Max,
    Pow,
    Round,
}

impl Function {
    /// Resolve a call name against the whitelist.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "abs" => Some(Function::Abs),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            "pow" => Some(Function::Pow),
            "round" => Some(Function::Round),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Min => "min",
            Function::Max => "max",
            Function::Pow => "pow",
            Function::Round => "round",
        }
    }

    /// Accepted argument counts, as `(min, max)`.
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Function::Abs => (1, Some(1)),
            Function::Min | Function::Max => (2, None),
            Function::Pow => (2, Some(2)),
            Function::Round => (1, Some(2)),
        }
    }

    /// Arity rendered for error messages.
    pub fn arity_text(self) -> &'static str {
        match self {
            Function::Abs => "1",
            Function::Min | Function::Max => "at least 2",
            Function::Pow => "2",
            Function::Round => "1 or 2",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `a < b <= c` holds when every adjacent pair holds.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOp, Expr)>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Variable names referenced anywhere in the expression, in first-use order.
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Unary { operand, .. } => operand.collect_variables(names),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(names);
                rhs.collect_variables(names);
            }
            Expr::Compare { first, rest } => {
                first.collect_variables(names);
                for (_, expr) in rest {
                    expr.collect_variables(names);
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(names);
                }
            }
        }
    }
}
