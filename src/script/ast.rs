#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// A piece of a double-quoted string.
#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Lit(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    BoolLit(bool),
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    Interpolated(Vec<StrPart>), // "a ${b} $c"
    List(Vec<Expr>),
    Var(String),
    Attribute(Box<Expr>, String),          // foo.bar
    Index(Box<Expr>, Box<Expr>),           // foo['bar']
    Method(Box<Expr>, String, Vec<Expr>),  // foo.bar(x)
    Call(String, Vec<Expr>),               // bar(x)
    Unary(UnaryOp, Box<Expr>),
    BinOp(Box<Expr>, BinOp, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub path: Vec<String>,
    pub alias: String,
    pub line: usize,
}

impl Import {
    pub fn dotted(&self) -> String {
        self.path.join(".")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Import(Import),
    Def(String, Option<Expr>),
    Assign(String, Expr),
    Out(Vec<Expr>), // out << a << b
    If {
        cases: Vec<(Expr, Vec<Stmt>)>, // (condition, body). Includes if and else-ifs.
        else_body: Option<Vec<Stmt>>,
    },
    For {
        target: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    Expr(Expr),
}

/// Visits every import statement, including those nested in blocks.
pub fn imports(body: &[Stmt]) -> Vec<&Import> {
    let mut found = Vec::new();
    for stmt in body {
        match stmt {
            Stmt::Import(import) => found.push(import),
            Stmt::If { cases, else_body } => {
                for (_, block) in cases {
                    found.extend(imports(block));
                }
                if let Some(block) = else_body {
                    found.extend(imports(block));
                }
            }
            Stmt::For { body, .. } => found.extend(imports(body)),
            _ => {}
        }
    }
    found
}
