/// Expression syntax tree for the code embedded in mustache tags and
/// attribute values.
///
/// Offsets are absolute byte offsets into the whole prompt source, so
/// expression errors point straight at the template text.

/// An expression with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub start: usize,
    pub end: usize,
}

impl Expression {
    pub fn new(kind: ExpressionKind, start: usize, end: usize) -> Self {
        Self { kind, start, end }
    }

    /// True when evaluating this expression can only produce a constant
    /// (used to check attributes that must be static).
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ExpressionKind::Literal(_))
    }
}

/// Literal values written directly in the source.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExpressionKind {
    Literal(Literal),
    Identifier(String),
    /// `[a, ...b]`
    Array(Vec<ArrayElement>),
    /// `{ a, b: 1, [k]: v, ...rest }`
    Object(Vec<ObjectMember>),
    /// `a, b, c`
    Sequence(Vec<Expression>),
    Binary {
        operator: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        operator: LogicalOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        operator: UnaryOperator,
        argument: Box<Expression>,
    },
    Update {
        operator: UpdateOperator,
        prefix: bool,
        argument: Box<Expression>,
    },
    Assignment {
        operator: AssignmentOperator,
        target: Box<Expression>,
        value: Box<Expression>,
    },
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    Member {
        object: Box<Expression>,
        property: MemberProperty,
        optional: bool,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<ArrayElement>,
        optional: bool,
    },
    /// Boundary of an optional chain: a short-circuit anywhere inside
    /// yields `undefined` for the whole chain.
    Chain(Box<Expression>),
}

/// An element of an array literal or an argument list.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayElement {
    Expression(Expression),
    Spread(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ObjectMember {
    Property { key: PropertyKey, value: Expression },
    Spread(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    /// Identifier, string or numeric key, already normalised to a string.
    Static(String),
    Computed(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    /// `object.name`
    Named(String),
    /// `object[expression]`
    Computed(Box<Expression>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    In,
    InstanceOf,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Exponent,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
}

impl BinaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::StrictEqual => "===",
            BinaryOperator::StrictNotEqual => "!==",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::In => "in",
            BinaryOperator::InstanceOf => "instanceof",
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Remainder => "%",
            BinaryOperator::Exponent => "**",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::ShiftLeft => "<<",
            BinaryOperator::ShiftRight => ">>",
            BinaryOperator::UnsignedShiftRight => ">>>",
        }
    }

    /// Operators the grammar accepts but the evaluator refuses.
    pub fn is_supported(&self) -> bool {
        !matches!(self, BinaryOperator::InstanceOf)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
    NullishCoalescing,
}

impl LogicalOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalOperator::And => "&&",
            LogicalOperator::Or => "||",
            LogicalOperator::NullishCoalescing => "??",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

impl UnaryOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Minus => "-",
            UnaryOperator::Plus => "+",
            UnaryOperator::BitNot => "~",
            UnaryOperator::TypeOf => "typeof",
            UnaryOperator::Void => "void",
            UnaryOperator::Delete => "delete",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, UnaryOperator::Void | UnaryOperator::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

impl UpdateOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOperator::Increment => "++",
            UpdateOperator::Decrement => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Exponent,
    ShiftLeft,
    ShiftRight,
    UnsignedShiftRight,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    NullishCoalescing,
}

/// What a compound assignment reduces to.
pub enum CompoundOperator {
    Binary(BinaryOperator),
    Logical(LogicalOperator),
}

impl AssignmentOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentOperator::Assign => "=",
            AssignmentOperator::Add => "+=",
            AssignmentOperator::Subtract => "-=",
            AssignmentOperator::Multiply => "*=",
            AssignmentOperator::Divide => "/=",
            AssignmentOperator::Remainder => "%=",
            AssignmentOperator::Exponent => "**=",
            AssignmentOperator::ShiftLeft => "<<=",
            AssignmentOperator::ShiftRight => ">>=",
            AssignmentOperator::UnsignedShiftRight => ">>>=",
            AssignmentOperator::BitAnd => "&=",
            AssignmentOperator::BitOr => "|=",
            AssignmentOperator::BitXor => "^=",
            AssignmentOperator::And => "&&=",
            AssignmentOperator::Or => "||=",
            AssignmentOperator::NullishCoalescing => "??=",
        }
    }

    /// The operator applied between the current and the assigned value,
    /// or `None` for plain `=`.
    pub fn compound(&self) -> Option<CompoundOperator> {
        use CompoundOperator::{Binary, Logical};
        let op = match self {
            AssignmentOperator::Assign => return None,
            AssignmentOperator::Add => Binary(BinaryOperator::Add),
            AssignmentOperator::Subtract => Binary(BinaryOperator::Subtract),
            AssignmentOperator::Multiply => Binary(BinaryOperator::Multiply),
            AssignmentOperator::Divide => Binary(BinaryOperator::Divide),
            AssignmentOperator::Remainder => Binary(BinaryOperator::Remainder),
            AssignmentOperator::Exponent => Binary(BinaryOperator::Exponent),
            AssignmentOperator::ShiftLeft => Binary(BinaryOperator::ShiftLeft),
            AssignmentOperator::ShiftRight => Binary(BinaryOperator::ShiftRight),
            AssignmentOperator::UnsignedShiftRight => Binary(BinaryOperator::UnsignedShiftRight),
            AssignmentOperator::BitAnd => Binary(BinaryOperator::BitAnd),
            AssignmentOperator::BitOr => Binary(BinaryOperator::BitOr),
            AssignmentOperator::BitXor => Binary(BinaryOperator::BitXor),
            AssignmentOperator::And => Logical(LogicalOperator::And),
            AssignmentOperator::Or => Logical(LogicalOperator::Or),
            AssignmentOperator::NullishCoalescing => Logical(LogicalOperator::NullishCoalescing),
        };
        Some(op)
    }
}
