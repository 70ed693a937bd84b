//! The object writer: per-kind external representations in machine (`write`)
//! and human (`display`) form, with optional `#N=`/`#N#` labeling of shared
//! and cyclic structure.

use crate::runtime::error::{Result, ScmError};
use crate::runtime::heap::{Cell, Heap, ObjRef};

use super::shared::interesting_ref;
use super::{Port, PortFlags, SubrKind, Value, WriteSsCtx};

/// Output form selector.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum OutputMode {
    /// Reader-compatible text: strings quoted, characters in `#\` notation.
    Write,
    /// Human-readable text: strings and characters as-is.
    Display,
}

struct SpecialCharInfo {
    code: char,
    /// Escape sequence used inside a written string literal.
    esc_seq: &'static str,
    /// Name following `#\` in written character notation.
    lex_rep: &'static str,
}

const SPECIAL_CHAR_TABLE: &[SpecialCharInfo] = &[
    SpecialCharInfo { code: '"', esc_seq: "\\\"", lex_rep: "\"" },
    SpecialCharInfo { code: '\\', esc_seq: "\\\\", lex_rep: "\\" },
    SpecialCharInfo { code: '\n', esc_seq: "\\n", lex_rep: "newline" },
    SpecialCharInfo { code: '\t', esc_seq: "\\t", lex_rep: "tab" },
    SpecialCharInfo { code: '\x07', esc_seq: "\\a", lex_rep: "alarm" },
    SpecialCharInfo { code: '\x08', esc_seq: "\\b", lex_rep: "backspace" },
    SpecialCharInfo { code: '\x0c', esc_seq: "\\f", lex_rep: "formfeed" },
    SpecialCharInfo { code: '\r', esc_seq: "\\r", lex_rep: "return" },
    SpecialCharInfo { code: ' ', esc_seq: " ", lex_rep: "space" },
    SpecialCharInfo { code: '\x7f', esc_seq: "\\x7f", lex_rep: "delete" },
];

fn special_char(c: char) -> Option<&'static SpecialCharInfo> {
    SPECIAL_CHAR_TABLE.iter().find(|info| info.code == c)
}

/// Writes `obj` to `port` in reader-compatible form.
///
/// Shared structure is not detected, so termination on cyclic input is the
/// caller's responsibility; use [`write_shared`] for arbitrary graphs.
pub fn write(heap: &Heap, port: Value, obj: Value) -> Result<()> {
    top_level(heap, port, obj, OutputMode::Write, None)
}

/// Writes `obj` to `port` in human-readable form.
pub fn display(heap: &Heap, port: Value, obj: Value) -> Result<()> {
    top_level(heap, port, obj, OutputMode::Display, None)
}

/// Writes `obj` in reader-compatible form with `#N=`/`#N#` labels for
/// objects referenced more than once, including through cycles. Safe on
/// arbitrary input.
pub fn write_shared(heap: &Heap, port: Value, obj: Value) -> Result<()> {
    let mut ctx = WriteSsCtx::new();
    ctx.scan(heap, obj);
    // An empty table means nothing was even eligible; skip the bookkeeping.
    if ctx.is_empty() {
        return top_level(heap, port, obj, OutputMode::Write, None);
    }
    log::debug!("sharing-aware write tracking {} objects", ctx.tracked());
    top_level(heap, port, obj, OutputMode::Write, Some(&mut ctx))
}

fn top_level(
    heap: &Heap,
    port: Value,
    obj: Value,
    mode: OutputMode,
    ctx: Option<&mut WriteSsCtx>,
) -> Result<()> {
    let port = ensure_output_port(heap, port)?;
    ObjWriter { heap, port, ctx }.write_obj(obj, mode)?;
    if heap.config.volatile_output {
        port.flush()?;
    }
    Ok(())
}

/// Destination checks, run before any text is emitted.
fn ensure_output_port<'h>(heap: &'h Heap, port: Value) -> Result<&'h Port> {
    let p = heap.port(port).ok_or(ScmError::ExpectedPort)?;
    if !p.is_live() {
        return Err(ScmError::PortClosed);
    }
    if !p.is_output() {
        return Err(ScmError::OutputPortRequired);
    }
    Ok(p)
}

struct ObjWriter<'h, 'c> {
    heap: &'h Heap,
    port: &'h Port,
    ctx: Option<&'c mut WriteSsCtx>,
}

impl<'h> ObjWriter<'h, '_> {
    fn puts(&mut self, s: &str) -> Result<()> {
        self.port.put_str(s)
    }

    fn putc(&mut self, c: char) -> Result<()> {
        self.port.put_char(c)
    }

    fn write_obj(&mut self, obj: Value, mode: OutputMode) -> Result<()> {
        if let Some(r) = interesting_ref(self.heap, obj) {
            if let Some(ctx) = self.ctx.as_deref_mut() {
                let index = ctx.shared_index(r);
                if index > 0 {
                    // Already defined; reference it instead of re-printing.
                    return self.puts(&format!("#{index}#"));
                }
                if index < 0 {
                    // Defining datum: label it, then print it in full.
                    self.puts(&format!("#{}=", -index))?;
                }
            }
        }

        let heap = self.heap;
        match obj {
            Value::Int(n) => self.puts(&n.to_string()),
            Value::Char(c) => self.write_char_obj(c, mode),
            Value::Nil
            | Value::True
            | Value::False
            | Value::Eof
            | Value::Unbound
            | Value::Undef => self.write_constant(obj),
            Value::Obj(r) => match heap.cell(r) {
                Cell::Pair { .. } => {
                    if heap.is_error_object(obj) {
                        self.write_errobj(obj, mode)
                    } else {
                        self.write_list(obj, mode)
                    }
                }
                Cell::Symbol { name, .. } => self.puts(name),
                Cell::Str(s) => self.write_string_obj(s, mode),
                Cell::Vector(items) => self.write_vector(items, mode),
                Cell::Closure { exp, .. } => {
                    self.puts("#<closure ")?;
                    self.write_obj(*exp, mode)?;
                    self.putc('>')
                }
                Cell::Subr { kind } => self.write_subr(r, *kind),
                Cell::Continuation => self.puts("#<subr continuation>"),
                Cell::Values(vals) => {
                    self.puts("#<values ")?;
                    if *vals == Value::Nil {
                        self.puts("()")?;
                    } else {
                        self.write_list(*vals, mode)?;
                    }
                    self.putc('>')
                }
                Cell::Port(p) => self.write_port_obj(p),
                Cell::CPointer(addr) => self.puts(&format!("#<c_pointer 0x{addr:x}>")),
                Cell::CFuncPointer(addr) => self.puts(&format!("#<c_func_pointer 0x{addr:x}>")),
            },
        }
    }

    fn write_char_obj(&mut self, c: char, mode: OutputMode) -> Result<()> {
        match mode {
            OutputMode::Write => {
                self.puts("#\\")?;
                if let Some(info) = special_char(c) {
                    return self.puts(info.lex_rep);
                }
                // Control characters outside the table get hexadecimal form.
                if c.is_ascii_control() {
                    return self.puts(&format!("x{:02x}", c as u32));
                }
                self.putc(c)
            }
            OutputMode::Display => self.putc(c),
        }
    }

    fn write_string_obj(&mut self, s: &str, mode: OutputMode) -> Result<()> {
        match mode {
            OutputMode::Write => {
                self.putc('"')?;
                for c in s.chars() {
                    match special_char(c) {
                        Some(info) => self.puts(info.esc_seq)?,
                        None => self.putc(c)?,
                    }
                }
                self.putc('"')
            }
            OutputMode::Display => self.puts(s),
        }
    }

    fn write_list(&mut self, mut lst: Value, mode: OutputMode) -> Result<()> {
        if lst == Value::Nil {
            return self.puts("()");
        }
        // Each label opened for a shared tail adds one pending close paren.
        let mut open_parens = 1usize;
        self.putc('(')?;
        'spine: loop {
            loop {
                self.write_obj(self.heap.car(lst), mode)?;
                lst = self.heap.cdr(lst);
                let Some(tail) = self.heap.pair_ref(lst) else {
                    break;
                };
                self.putc(' ')?;
                // The head's label was handled by write_obj; every later
                // tail pointer must be re-checked here, or a shared tail
                // would be walked again (forever, if circular).
                if let Some(ctx) = self.ctx.as_deref_mut() {
                    let index = ctx.shared_index(tail);
                    if index > 0 {
                        self.puts(&format!(". #{index}#"))?;
                        break 'spine;
                    }
                    if index < 0 {
                        self.puts(&format!(". #{}=(", -index))?;
                        open_parens += 1;
                    }
                }
            }
            if lst != Value::Nil {
                self.puts(" . ")?;
                self.write_obj(lst, mode)?;
            }
            break;
        }
        for _ in 0..open_parens {
            self.putc(')')?;
        }
        Ok(())
    }

    fn write_vector(&mut self, items: &[Value], mode: OutputMode) -> Result<()> {
        self.puts("#(")?;
        for (i, &item) in items.iter().enumerate() {
            if i > 0 {
                self.putc(' ')?;
            }
            self.write_obj(item, mode)?;
        }
        self.putc(')')
    }

    fn write_subr(&mut self, r: ObjRef, kind: SubrKind) -> Result<()> {
        self.puts(match kind {
            SubrKind::Syntax => "#<syntax ",
            SubrKind::Procedure => "#<subr ",
        })?;
        let heap = self.heap;
        match heap.symbol_bound_to(Value::Obj(r)) {
            Some(name) => self.puts(name)?,
            None => self.puts(&format!("0x{:x}", r.index()))?,
        }
        self.putc('>')
    }

    fn write_port_obj(&mut self, p: &Port) -> Result<()> {
        self.puts("#<")?;
        if p.flags().contains(PortFlags::INPUT) {
            self.putc('i')?;
        }
        if p.flags().contains(PortFlags::OUTPUT) {
            self.putc('o')?;
        }
        self.puts("port")?;
        let info = p.inspect();
        if !info.is_empty() {
            self.putc(' ')?;
            self.puts(&info)?;
        }
        self.putc('>')
    }

    fn write_constant(&mut self, obj: Value) -> Result<()> {
        let text = match obj {
            Value::Nil => "()",
            Value::True => "#t",
            Value::False => "#f",
            Value::Eof => {
                if self.heap.config.siod_bugs {
                    "(eof)"
                } else {
                    "#<eof>"
                }
            }
            Value::Unbound => "#<unbound>",
            Value::Undef => "#<undef>",
            Value::Int(_) | Value::Char(_) | Value::Obj(_) => unreachable!("not a constant"),
        };
        self.puts(text)
    }

    fn write_errobj(&mut self, obj: Value, mode: OutputMode) -> Result<()> {
        let (_tag, reason, irritants, _trace) = self.heap.error_object_parts(obj)?;
        match mode {
            OutputMode::Write => {
                self.puts("#<error ")?;
                self.write_plain(reason, OutputMode::Write)?;
            }
            OutputMode::Display => {
                self.write_plain(reason, OutputMode::Display)?;
                if self.heap.is_pair(irritants) {
                    self.putc(':')?;
                }
            }
        }
        // Irritants are machine-written even under display, so a string
        // irritant cannot blur into the reason text.
        let mut rest = irritants;
        while let Some(r) = self.heap.pair_ref(rest) {
            let (car, cdr) = self.heap.pair_parts(r);
            self.putc(' ')?;
            self.write_plain(car, OutputMode::Write)?;
            rest = cdr;
        }
        if mode == OutputMode::Write {
            self.putc('>')?;
        }
        Ok(())
    }

    /// Sub-print that opts out of sharing bookkeeping; error-object slots
    /// are always printed in full.
    fn write_plain(&mut self, obj: Value, mode: OutputMode) -> Result<()> {
        ObjWriter {
            heap: self.heap,
            port: self.port,
            ctx: None,
        }
        .write_obj(obj, mode)
    }
}
