/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str, // one line, printed by `explain --list`
    pub long: &'static str,  // full explanation for `explain CODE`
}

/// All stable error codes reported by jsmm.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Loading ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "JSMM-C001",
        short: "malformed program tree",
        long: r#"## JSMM-C001: malformed program tree

The program tree could not be turned into something runnable. A node
refers to a child that does not exist, a node contains itself, the root
is not a Program, or a node sits where a node of a different kind is
required (for example a statement where an expression belongs).

The tree is produced by the parser, so this points at a parser bug or
a hand-edited tree file rather than at the program itself.
"#,
    },
    ErrorEntry {
        code: "JSMM-C002",
        short: "unreadable program tree file",
        long: r#"## JSMM-C002: unreadable program tree file

The file given to `jsmm run` is not valid JSON, or its JSON does not
have the shape of a program tree: an object with `root`, `nodes` and an
optional `source`.
"#,
    },
    // ── Runtime ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "JSMM-R001",
        short: "value is undefined",
        long: r#"## JSMM-R001: value is undefined

A variable or expression was used before it had a value.

**Example:**

    var x;
    var y = x + 1;

`x` was declared but never assigned, so `x + 1` cannot be computed.
Give `x` a value first.
"#,
    },
    ErrorEntry {
        code: "JSMM-R002",
        short: "value is null",
        long: r#"## JSMM-R002: value is null

An expression evaluated to `null` where a real value is needed.

**Example:**

    var x = null;
    console.log(x);
"#,
    },
    ErrorEntry {
        code: "JSMM-R003",
        short: "not a valid number",
        long: r#"## JSMM-R003: not a valid number

Arithmetic and comparisons only work on finite numbers. This error is
reported when an operand is not a number, or when a computation
produced infinity or NaN.

**Example:**

    var x = "a" * 2;
"#,
    },
    ErrorEntry {
        code: "JSMM-R004",
        short: "not a function",
        long: r#"## JSMM-R004: not a function

Only functions can be called.

**Example:**

    var x = 5;
    x();
"#,
    },
    ErrorEntry {
        code: "JSMM-R005",
        short: "not a boolean",
        long: r#"## JSMM-R005: not a boolean

Conditions of `if`, `while` and `for`, the operands of `&&` and `||`,
and the operand of `!` must be booleans. There is no truthiness.

**Example:**

    var x = 1;
    if (x) {
      console.log("one");
    }

Write `if (x == 1)` instead.
"#,
    },
    ErrorEntry {
        code: "JSMM-R006",
        short: "division by zero",
        long: r#"## JSMM-R006: division by zero

The right side of `/` or `%` (or `/=` and `%=`) was zero.

**Example:**

    var x = 5 / 0;
"#,
    },
    ErrorEntry {
        code: "JSMM-R007",
        short: "missing property",
        long: r#"## JSMM-R007: missing property

A property was read that the object does not have. Host objects only
expose the functions and variables they were created with. Arrays and
strings only have `length`.
"#,
    },
    ErrorEntry {
        code: "JSMM-R008",
        short: "invalid index",
        long: r#"## JSMM-R008: invalid index

Indexing needs an array on the left and a whole number within the
array's bounds inside the brackets.

**Example:**

    var a = [1, 2];
    var b = a[5];

`a` has indexes 0 and 1 only.
"#,
    },
    ErrorEntry {
        code: "JSMM-R009",
        short: "too few arguments",
        long: r#"## JSMM-R009: too few arguments

A function was called with fewer arguments than it declares
parameters. Extra arguments are allowed and ignored.

**Example:**

    function add(a, b) {
      return a + b;
    }
    add(1);
"#,
    },
    ErrorEntry {
        code: "JSMM-R010",
        short: "conflicting declaration",
        long: r#"## JSMM-R010: conflicting declaration

A variable and a function cannot share a name in the same scope, and a
name cannot be declared twice by different declarations.

**Example:**

    function x() {}
    var x = 1;
"#,
    },
    ErrorEntry {
        code: "JSMM-R011",
        short: "too many nested function calls",
        long: r#"## JSMM-R011: too many nested function calls

Function calls nested deeper than the configured limit
(`max_call_stack_depth`, 100 by default). This usually means a recursive
function never reaches the case that stops the recursion.

**Example:**

    function f() {
      f();
    }
    f();
"#,
    },
    ErrorEntry {
        code: "JSMM-R012",
        short: "program takes too long to run",
        long: r#"## JSMM-R012: program takes too long to run

The program used up its execution budget (`max_execution_cost`, 4000
by default). Every pass through a block of statements costs one more
than the number of statements in it, so an endless loop always ends
with this error.

**Example:**

    while (true) {
    }
"#,
    },
    ErrorEntry {
        code: "JSMM-R013",
        short: "host function failed",
        long: r#"## JSMM-R013: host function failed

A function provided by the host (such as `console.log`) reported an
error. The message says what went wrong; the location is the call.
"#,
    },
    ErrorEntry {
        code: "JSMM-R014",
        short: "unknown variable",
        long: r#"## JSMM-R014: unknown variable

A name was used that is not declared in any enclosing scope and is not
provided by the host.

**Example:**

    console.log(y);
"#,
    },
    ErrorEntry {
        code: "JSMM-R015",
        short: "invalid assignment",
        long: r#"## JSMM-R015: invalid assignment

The value could not be stored. Functions cannot be assigned to, and a
host variable may reject a value it does not accept.

**Example:**

    function f() {}
    f = 3;
"#,
    },
];

/// Look up an error entry by code (e.g. `"JSMM-R006"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code.eq_ignore_ascii_case(code))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::ErrorKind;

    #[test]
    fn lookup_known_code() {
        let e = lookup("JSMM-R006").expect("JSMM-R006 should be in registry");
        assert_eq!(e.code, "JSMM-R006");
        assert!(!e.short.is_empty());
        assert!(e.long.contains("JSMM-R006"));
    }

    #[test]
    fn lookup_ignores_case() {
        assert_eq!(lookup("jsmm-r011").map(|e| e.code), Some("JSMM-R011"));
    }

    #[test]
    fn lookup_unknown_returns_none() {
        assert!(lookup("JSMM-XXXX").is_none());
        assert!(lookup("").is_none());
    }

    #[test]
    fn every_error_kind_is_registered() {
        for kind in ErrorKind::ALL {
            assert!(lookup(kind.code()).is_some(), "{} has no registry entry", kind.code());
        }
    }

    #[test]
    fn all_codes_unique() {
        let mut codes: Vec<&str> = REGISTRY.iter().map(|e| e.code).collect();
        codes.sort_unstable();
        let len_before = codes.len();
        codes.dedup();
        assert_eq!(codes.len(), len_before, "duplicate codes in registry");
    }

    #[test]
    fn all_codes_have_content() {
        for entry in REGISTRY {
            assert!(!entry.short.is_empty(), "{} missing short description", entry.code);
            assert!(entry.long.starts_with(&format!("## {}", entry.code)), "{} has a bad heading", entry.code);
        }
    }
}
