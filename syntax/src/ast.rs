/// type alias just to make type signatures look more consistent.
pub type Ident<'a> = &'a str;

/// How an argument gets its value.
#[derive(Debug, PartialEq, Eq)]
pub enum Binding<'a> {
    /// `fixed value`: set once, never overridden.
    Fixed(&'a str),
    /// `marker [value]`: may be changed or linked; an absent value is empty.
    Parametric {
        marker: Ident<'a>,
        value: Option<&'a str>,
    },
    /// `marker to_temp [prefix]`: a fresh temp file at run time.
    ToTemp {
        marker: Ident<'a>,
        prefix: Option<&'a str>,
    },
}

/// One declared argument, e.g. `in "raw data" csv /data/raw.csv`.
#[derive(Debug, PartialEq, Eq)]
pub struct ArgSpec<'a> {
    /// in, out, pub, sub or text
    pub kind: Ident<'a>,
    pub description: &'a str,
    pub binding: Binding<'a>,
}

/// One line inside an invocation block.
#[derive(Debug, PartialEq, Eq)]
pub enum Stmt<'a> {
    /// `module <kind> <location> [entry <symbol>]`
    Module {
        kind: Ident<'a>,
        location: &'a str,
        entry: Option<&'a str>,
    },
    /// `memory <megabytes>`; checked when the pipeline is loaded.
    Memory(&'a str),
    /// `flag <runtime flag>`
    Flag(&'a str),
    Arg(ArgSpec<'a>),
}

/// `invocation name { ... }`
#[derive(Debug, PartialEq, Eq)]
pub struct InvocationBlock<'a> {
    pub name: Ident<'a>,
    pub stmts: Vec<Stmt<'a>>,
}

/// `invocation.index`, naming one argument slot by its 1-based position.
#[derive(Debug, PartialEq, Eq)]
pub struct SlotRef<'a> {
    pub invocation: Ident<'a>,
    /// checked when the pipeline is loaded.
    pub index: &'a str,
}

/// One high-level item in the pipeline file.
#[derive(Debug, PartialEq, Eq)]
pub enum Item<'a> {
    /// A block of `key = value` config lines.
    Config(Vec<(Ident<'a>, &'a str)>),
    /// An invocation definition.
    Invocation(InvocationBlock<'a>),
    /// `order waiter after pred1 pred2 ...`
    Order {
        waiter: Ident<'a>,
        predecessors: Vec<Ident<'a>>,
    },
    /// `link source.index to destination.index`
    Link {
        source: SlotRef<'a>,
        destination: SlotRef<'a>,
    },
}

// These methods are just to assist with writing more legible tests.
#[cfg(test)]
impl<'a> ArgSpec<'a> {
    pub fn fixed(kind: Ident<'a>, description: &'a str, value: &'a str) -> Self {
        Self {
            kind,
            description,
            binding: Binding::Fixed(value),
        }
    }
    pub fn parametric(
        kind: Ident<'a>,
        description: &'a str,
        marker: Ident<'a>,
        value: Option<&'a str>,
    ) -> Self {
        Self {
            kind,
            description,
            binding: Binding::Parametric { marker, value },
        }
    }
    pub fn to_temp(
        kind: Ident<'a>,
        description: &'a str,
        marker: Ident<'a>,
        prefix: Option<&'a str>,
    ) -> Self {
        Self {
            kind,
            description,
            binding: Binding::ToTemp { marker, prefix },
        }
    }
}
