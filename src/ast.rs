/// A parsed program: top-level statements in order.
pub type Program = Vec<Node>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

impl BinOp {
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Shl => "<<",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::LtEq => "<=",
            BinOp::GtEq => ">=",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Int(i64),
    Str(String),
    Regex(String),
    Nil,
    True,
    False,
    SelfRef,
    /// A bare name: local variable, or a method call on `self` with no arguments.
    Ident(String),
    Const(String),
    Assign(String, Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
    Neg(Box<Node>),
    Call {
        recv: Option<Box<Node>>,
        name: String,
        args: Vec<Node>,
    },
    If {
        cond: Box<Node>,
        then_body: Vec<Node>,
        else_body: Vec<Node>,
    },
    While {
        cond: Box<Node>,
        body: Vec<Node>,
        /// `until`: loop while the condition is false.
        negate: bool,
    },
    Def {
        name: String,
        params: Vec<String>,
        body: Vec<Node>,
    },
    Class {
        name: String,
        body: Vec<Node>,
    },
    Return(Option<Box<Node>>),
    Break(Option<Box<Node>>),
    Next(Option<Box<Node>>),
}
