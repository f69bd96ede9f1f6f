//! The assembly compiler.
//!
//! Parses the line-oriented VM assembly format, builds the functor graph
//! and code space, and resolves forward references. Two independent
//! deferred-fixup lists are kept: functor source labels that were not
//! yet defined when a declaration referenced them, and code labels used
//! by jumps before their definition. [`Compiler::compile_cleanup`]
//! sweeps both lists to a fixed point; residual entries are the error
//! set.
//!
//! Statement forms:
//!
//! ```text
//! # comment to end of line
//! :module "name"
//! :vpi_module "name"
//! label .functor TYPE, init, src0, src1, src2, src3
//! label .event posedge|negedge|edge, src0..src3
//! label .event "name"
//! label .event/or src0, src1, ...
//! label .var "name", msb, lsb [, signed]
//! label .net "name", msb, lsb [, signed], src0..src{w-1}
//! label .scope "name" [, parent_label]
//! .thread start_label
//! codelabel: %mnemonic operand, operand, operand
//! ```
//!
//! A functor reference is `label[bit]`, with `[bit]` defaulting to 0.
//! Numbers are decimal; strings are double-quoted with the usual
//! escapes.

use crate::codes::{opcode_lookup, CodePtr, ForkExtend, Instruction, Opcode, OperandType};
use crate::error::VvmError;
use crate::functor::{EdgeTable, FunctorMode, FunctorTable, Ipoint};
use crate::schedule::Runtime;
use crate::symbols::SymbolTable;
use crate::vpi::{SystemTask, VpiObject, VpiRef};
use std::collections::HashMap;
use std::fmt::Write as _;
use veris_common::Logic;
use veris_diagnostics::{Diagnostic, DiagnosticCode, DiagnosticSink, SourceLoc};

/// A parsed operand.
#[derive(Clone, Debug, PartialEq)]
enum Operand {
    /// A decimal number, possibly negative (for msb/lsb ranges).
    Number(i64),
    /// A double-quoted string.
    Str(String),
    /// A symbol with an optional `[bit]` suffix.
    Symb { text: String, idx: u32 },
}

/// A postponed functor-input connection.
#[derive(Debug)]
struct PortResolv {
    /// The destination input port awaiting its driver.
    port: Ipoint,
    /// The undefined source label.
    source: String,
    /// The bit offset into the source vector.
    idx: u32,
}

/// Which slot of an instruction a pending code label fills.
#[derive(Debug, Clone, Copy, PartialEq)]
enum CodeSlot {
    /// The plain `cptr` operand.
    Cptr,
    /// The target inside a `%fork` extension.
    ForkCptr,
}

/// A postponed code-label reference.
#[derive(Debug)]
struct CodeResolv {
    at: CodePtr,
    slot: CodeSlot,
    label: String,
}

/// A host module installer, invoked by `:module`/`:vpi_module`.
pub type ModuleInstaller = Box<dyn Fn(&mut Runtime)>;

/// The assembly compiler.
///
/// Feed text with [`compile_string`](Self::compile_string), finish with
/// [`compile_cleanup`](Self::compile_cleanup), then take the machine
/// with [`into_runtime`](Self::into_runtime).
pub struct Compiler {
    runtime: Runtime,
    sink: DiagnosticSink,
    file: String,
    line: u32,

    sym_functors: SymbolTable<u32>,
    sym_codespace: SymbolTable<CodePtr>,
    sym_vpi: SymbolTable<VpiRef>,

    resolv_list: Vec<PortResolv>,
    cresolv_list: Vec<CodeResolv>,

    cur_scope: VpiRef,
    modules: HashMap<String, ModuleInstaller>,

    // Records for re-serialization.
    header_lines: Vec<String>,
    decl_lines: Vec<String>,
    thread_lines: Vec<String>,
    /// Declared functor vectors as (base, count, label).
    functor_spans: Vec<(u32, u32, String)>,
    /// Reverse map from VPI handles to their declaration labels.
    vpi_labels: HashMap<u32, String>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new("<input>")
    }
}

impl Compiler {
    /// Creates a compiler for input named `file`.
    ///
    /// The `$time` handle is pre-registered, as every host module
    /// expects it.
    pub fn new(file: &str) -> Self {
        let mut runtime = Runtime::new();
        let mut sym_vpi = SymbolTable::new();
        let time = runtime.vpi.register(VpiObject::SimTime);
        sym_vpi.set("$time", time);
        Self {
            runtime,
            sink: DiagnosticSink::new(),
            file: file.to_string(),
            line: 0,
            sym_functors: SymbolTable::new(),
            sym_codespace: SymbolTable::new(),
            sym_vpi,
            resolv_list: Vec::new(),
            cresolv_list: Vec::new(),
            cur_scope: VpiRef::NULL,
            modules: HashMap::new(),
            header_lines: Vec::new(),
            decl_lines: Vec::new(),
            thread_lines: Vec::new(),
            functor_spans: Vec::new(),
            vpi_labels: HashMap::new(),
        }
    }

    /// Registers a host system task on the runtime under `$name`.
    pub fn register_task(&mut self, name: &str, task: Box<dyn SystemTask>) {
        self.runtime.tasks.register(name, task);
    }

    /// Registers a host module installer for `:module`/`:vpi_module`.
    pub fn register_module(&mut self, name: &str, installer: ModuleInstaller) {
        self.modules.insert(name.to_string(), installer);
    }

    /// The number of compile errors so far.
    pub fn error_count(&self) -> usize {
        self.sink.error_count()
    }

    /// A snapshot of the accumulated diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.sink.diagnostics()
    }

    /// Read access to the machine under construction.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Finishes the compile: fails with the error count when any
    /// diagnostics were errors, otherwise hands over the runtime.
    pub fn into_runtime(self) -> Result<Runtime, VvmError> {
        let count = self.sink.error_count();
        if count > 0 {
            return Err(VvmError::CompileErrors { count });
        }
        Ok(self.runtime)
    }

    fn err(&self, code: u16, msg: impl Into<String>) {
        self.sink.emit(Diagnostic::error(
            DiagnosticCode::error(code),
            msg,
            SourceLoc::new(self.file.clone(), self.line),
        ));
    }

    /// Compiles a whole text, line by line.
    pub fn compile_string(&mut self, text: &str) {
        for line in text.lines() {
            self.line += 1;
            self.compile_line(line);
        }
    }

    /// Compiles one source line.
    pub fn compile_line(&mut self, raw: &str) {
        let line = strip_comment(raw).trim().to_string();
        if line.is_empty() {
            return;
        }

        if let Some(rest) = line.strip_prefix(':') {
            self.compile_header(rest);
            return;
        }

        // Leading code label?
        let mut stmt = line.as_str();
        if let Some(colon) = find_label_colon(stmt) {
            let label = stmt[..colon].trim();
            if is_ident(label) {
                self.sym_codespace.set(label, self.runtime.code.next());
                stmt = stmt[colon + 1..].trim_start();
                if stmt.is_empty() {
                    return;
                }
            }
        }

        if stmt.starts_with('.') {
            let (directive, rest) = split_word(stmt);
            if directive == ".thread" {
                let ops = self.parse_operands(rest);
                self.compile_thread(&ops);
            } else {
                self.err(101, format!("directive needs a label: {directive}"));
            }
            return;
        }

        if stmt.starts_with('%') {
            let (mnem, rest) = split_word(stmt);
            let ops = self.parse_operands(rest);
            self.compile_code(mnem, &ops);
            return;
        }

        // label .directive operands
        let (label, rest) = split_word(stmt);
        if !is_ident(label) || !rest.trim_start().starts_with('.') {
            self.err(101, format!("syntax error: {stmt}"));
            return;
        }
        let (directive, rest) = split_word(rest.trim_start());
        let ops = self.parse_operands(rest);
        match directive {
            ".functor" => self.compile_functor(label, &ops),
            ".event" => self.compile_event(label, &ops),
            ".event/or" => self.compile_event_or(label, &ops),
            ".var" => self.compile_variable(label, &ops, false),
            ".net" => self.compile_variable(label, &ops, true),
            ".scope" => self.compile_scope(label, &ops),
            other => self.err(101, format!("unknown directive: {other}")),
        }
    }

    fn compile_header(&mut self, rest: &str) {
        let (word, args) = split_word(rest);
        let ops = self.parse_operands(args);
        match (word, ops.as_slice()) {
            ("module" | "vpi_module", [Operand::Str(name)]) => {
                if let Some(installer) = self.modules.remove(name) {
                    installer(&mut self.runtime);
                    self.modules.insert(name.clone(), installer);
                    self.header_lines
                        .push(format!(":{word} \"{}\"", escape(name)));
                } else {
                    self.err(105, format!("unknown module: {name}"));
                }
            }
            _ => self.err(101, format!("malformed header directive: :{rest}")),
        }
    }

    /// Parses a comma-separated operand list.
    fn parse_operands(&mut self, rest: &str) -> Vec<Operand> {
        let rest = rest.trim();
        if rest.is_empty() {
            return Vec::new();
        }
        let mut out = Vec::new();
        for tok in split_commas(rest) {
            let tok = tok.trim();
            if tok.is_empty() {
                self.err(103, "empty operand");
                continue;
            }
            match parse_operand(tok) {
                Some(op) => out.push(op),
                None => self.err(103, format!("malformed operand: {tok}")),
            }
        }
        out
    }

    /// Connects the `port` input of a new functor to the source named by
    /// `symb`, postponing the link when the source is not yet defined.
    fn link_input(&mut self, port: Ipoint, symb: &Operand) {
        let Operand::Symb { text, idx } = symb else {
            self.err(103, "functor source must be a symbol");
            return;
        };
        match self.sym_functors.get(text) {
            Some(base) => {
                self.runtime.functors.add_dest(base + idx, port);
            }
            None => self.resolv_list.push(PortResolv {
                port,
                source: text.clone(),
                idx: *idx,
            }),
        }
    }

    fn define_functor_label(&mut self, label: &str, base: u32, count: u32) -> bool {
        if self.sym_functors.contains(label) {
            self.err(106, format!("functor redefinition: {label}"));
            return false;
        }
        self.sym_functors.set(label, base);
        self.functor_spans.push((base, count, label.to_string()));
        true
    }

    fn compile_functor(&mut self, label: &str, ops: &[Operand]) {
        if ops.len() < 2 || ops.len() > 6 {
            self.err(102, "operand count for .functor");
            return;
        }
        let Operand::Symb { text: type_name, .. } = &ops[0] else {
            self.err(103, ".functor type must be a symbol");
            return;
        };
        let Some(table) = FunctorTable::from_name(type_name) else {
            self.err(104, format!("invalid functor type: {type_name}"));
            return;
        };
        let Operand::Number(init) = ops[1] else {
            self.err(103, ".functor init must be a number");
            return;
        };

        let fdx = self
            .runtime
            .functors
            .allocate(1, FunctorMode::Table(table));
        if !self.define_functor_label(label, fdx, 1) {
            return;
        }
        {
            let f = self.runtime.functors.get_mut(fdx);
            f.ival = init as u8;
            f.init = init as u8;
            f.oval = Logic::X.as_u2();
        }
        let srcs = &ops[2..];
        for (i, src) in srcs.iter().enumerate() {
            self.link_input(Ipoint::make(fdx, i as u32), src);
        }

        let mut text = format!("{label} .functor {type_name}, {init}");
        for src in srcs {
            let _ = write!(text, ", {}", operand_text(src));
        }
        self.decl_lines.push(text);
    }

    fn compile_event(&mut self, label: &str, ops: &[Operand]) {
        if ops.is_empty() {
            self.err(102, "operand count for .event");
            return;
        }
        // A string operand declares a named event.
        if let Operand::Str(name) = &ops[0] {
            if ops.len() != 1 {
                self.err(102, "operand count for named .event");
                return;
            }
            let fdx = self
                .runtime
                .functors
                .allocate(1, FunctorMode::NamedEvent { threads: Vec::new() });
            if !self.define_functor_label(label, fdx, 1) {
                return;
            }
            let f = self.runtime.functors.get_mut(fdx);
            f.ival = 0xaa;
            f.init = 0xaa;
            self.decl_lines
                .push(format!("{label} .event \"{}\"", escape(name)));
            return;
        }

        let Operand::Symb { text: edge_name, .. } = &ops[0] else {
            self.err(103, ".event edge must be a symbol or string");
            return;
        };
        let Some(table) = EdgeTable::from_name(edge_name) else {
            self.err(104, format!("invalid edge type: {edge_name}"));
            return;
        };
        if ops.len() > 5 {
            self.err(102, "too many .event sources");
            return;
        }
        let fdx = self.runtime.functors.allocate(
            1,
            FunctorMode::EdgeEvent {
                table,
                threads: Vec::new(),
            },
        );
        if !self.define_functor_label(label, fdx, 1) {
            return;
        }
        {
            let f = self.runtime.functors.get_mut(fdx);
            f.ival = 0xaa;
            f.init = 0xaa;
        }
        for (i, src) in ops[1..].iter().enumerate() {
            self.link_input(Ipoint::make(fdx, i as u32), src);
        }

        let mut text = format!("{label} .event {edge_name}");
        for src in &ops[1..] {
            let _ = write!(text, ", {}", operand_text(src));
        }
        self.decl_lines.push(text);
    }

    fn compile_event_or(&mut self, label: &str, ops: &[Operand]) {
        if ops.is_empty() {
            self.err(102, ".event/or needs at least one source");
            return;
        }
        let fdx = self
            .runtime
            .functors
            .allocate(1, FunctorMode::NamedEvent { threads: Vec::new() });
        if !self.define_functor_label(label, fdx, 1) {
            return;
        }
        {
            let f = self.runtime.functors.get_mut(fdx);
            f.ival = 0xaa;
            f.init = 0xaa;
        }
        for src in ops {
            let Operand::Symb { text, idx } = src else {
                self.err(103, ".event/or source must be a symbol");
                continue;
            };
            // Sources must already exist and have a free output.
            let Some(base) = self.sym_functors.get(text) else {
                self.err(107, format!("functor undefined: {text}"));
                continue;
            };
            let src_index = base + idx;
            if !self.runtime.functors.get(src_index).out.is_null() {
                self.err(103, format!("event source {text} already has fan-out"));
                continue;
            }
            self.runtime
                .functors
                .add_dest(src_index, Ipoint::make(fdx, 0));
        }

        let mut text = format!("{label} .event/or");
        for (i, src) in ops.iter().enumerate() {
            let sep = if i == 0 { ' ' } else { ',' };
            let _ = write!(text, "{sep}{}", operand_text(src));
        }
        self.decl_lines.push(text);
    }

    /// Compiles `.var` and `.net`: a vector of pass-through functors
    /// published through VPI. For `.net` each bit's port 0 is wired to a
    /// source.
    fn compile_variable(&mut self, label: &str, ops: &[Operand], is_net: bool) {
        if ops.len() < 3 {
            self.err(102, "operand count for .var/.net");
            return;
        }
        let Operand::Str(name) = &ops[0] else {
            self.err(103, "variable name must be a string");
            return;
        };
        let (Operand::Number(msb), Operand::Number(lsb)) = (&ops[1], &ops[2]) else {
            self.err(103, "variable range must be numeric");
            return;
        };
        let (msb, lsb) = (*msb, *lsb);
        let mut rest = &ops[3..];
        let mut signed = false;
        if let Some(Operand::Symb { text, .. }) = rest.first() {
            if text == "signed" {
                signed = true;
                rest = &rest[1..];
            }
        }
        let wid = (msb - lsb).unsigned_abs() as u32 + 1;

        let base = self
            .runtime
            .functors
            .allocate(wid, FunctorMode::Table(FunctorTable::Var));
        if !self.define_functor_label(label, base, wid) {
            return;
        }
        for i in 0..wid {
            let f = self.runtime.functors.get_mut(base + i);
            f.ival = 0x02;
            f.init = 0x02;
        }

        if is_net {
            if rest.len() != wid as usize {
                self.err(
                    102,
                    format!(".net expects {wid} sources, found {}", rest.len()),
                );
                return;
            }
            for (i, src) in rest.iter().enumerate() {
                self.link_input(Ipoint::make(base + i as u32, 0), src);
            }
        } else if !rest.is_empty() {
            self.err(102, "trailing operands on .var");
            return;
        }

        let obj = if is_net {
            VpiObject::Net {
                name: name.clone(),
                msb,
                lsb,
                signed,
                base,
            }
        } else {
            VpiObject::Reg {
                name: name.clone(),
                msb,
                lsb,
                signed,
                base,
            }
        };
        let handle = self.runtime.vpi.register(obj);
        self.sym_vpi.set(label, handle);
        self.vpi_labels.insert(handle.as_raw(), label.to_string());

        let kind = if is_net { ".net" } else { ".var" };
        let mut text = format!("{label} {kind} \"{}\", {msb}, {lsb}", escape(name));
        if signed {
            text.push_str(", signed");
        }
        for src in rest.iter().take(if is_net { rest.len() } else { 0 }) {
            let _ = write!(text, ", {}", operand_text(src));
        }
        self.decl_lines.push(text);
    }

    fn compile_scope(&mut self, label: &str, ops: &[Operand]) {
        let Some(Operand::Str(name)) = ops.first() else {
            self.err(103, ".scope name must be a string");
            return;
        };
        let parent = match ops.get(1) {
            None => VpiRef::NULL,
            Some(Operand::Symb { text, .. }) => match self.sym_vpi.get(text) {
                Some(h) if self.runtime.vpi.is_scope(h) => h,
                _ => {
                    self.err(109, format!("unknown parent scope: {text}"));
                    return;
                }
            },
            Some(_) => {
                self.err(103, ".scope parent must be a symbol");
                return;
            }
        };
        let handle = self.runtime.vpi.register(VpiObject::Scope {
            name: name.clone(),
            parent,
        });
        self.sym_vpi.set(label, handle);
        self.vpi_labels.insert(handle.as_raw(), label.to_string());
        self.cur_scope = handle;

        let mut text = format!("{label} .scope \"{}\"", escape(name));
        if let Some(Operand::Symb { text: p, .. }) = ops.get(1) {
            let _ = write!(text, ", {p}");
        }
        self.decl_lines.push(text);
    }

    fn compile_thread(&mut self, ops: &[Operand]) {
        let Some(Operand::Symb { text, .. }) = ops.first() else {
            self.err(103, ".thread start must be a symbol");
            return;
        };
        let Some(pc) = self.sym_codespace.get(text) else {
            self.err(109, format!("unresolved address: {text}"));
            return;
        };
        let thr = self.runtime.new_thread(pc, self.cur_scope);
        self.runtime.schedule_vthread(thr, 0);
        self.thread_lines.push(format!(".thread {text}"));
    }

    /// Compiles one executable statement into the code space.
    fn compile_code(&mut self, mnem: &str, ops: &[Operand]) {
        // The extended-operand instructions are special statement forms.
        match mnem {
            "%fork" => return self.compile_fork(ops),
            "%disable" => return self.compile_disable(ops),
            "%vpi_call" => return self.compile_vpi_call(ops),
            _ => {}
        }

        let ptr = self.runtime.code.allocate();
        let Some(entry) = opcode_lookup(mnem) else {
            self.err(101, format!("invalid opcode: {mnem}"));
            return;
        };
        self.runtime.code.get_mut(ptr).opcode = entry.opcode;

        if entry.argc != ops.len() {
            self.err(
                102,
                format!("operand count for {mnem}: expected {}", entry.argc),
            );
            return;
        }

        for (i, op) in ops.iter().enumerate() {
            match entry.args[i] {
                OperandType::None => {}
                OperandType::Bit1 | OperandType::Bit2 | OperandType::Number => {
                    let Operand::Number(n) = op else {
                        self.err(103, format!("operand format for {mnem}"));
                        continue;
                    };
                    if *n < 0 {
                        self.err(103, format!("operand must be unsigned for {mnem}"));
                        continue;
                    }
                    let code = self.runtime.code.get_mut(ptr);
                    match entry.args[i] {
                        OperandType::Bit1 => code.bit_idx1 = *n as u32,
                        OperandType::Bit2 => code.bit_idx2 = *n as u32,
                        OperandType::Number => code.number = *n as u64,
                        _ => unreachable!(),
                    }
                }
                OperandType::CodePtr => {
                    let Operand::Symb { text, idx } = op else {
                        self.err(103, format!("operand format for {mnem}"));
                        continue;
                    };
                    if *idx != 0 {
                        self.err(103, "code labels take no bit index");
                        continue;
                    }
                    match self.sym_codespace.get(text) {
                        Some(target) => self.runtime.code.get_mut(ptr).cptr = target,
                        None => self.cresolv_list.push(CodeResolv {
                            at: ptr,
                            slot: CodeSlot::Cptr,
                            label: text.clone(),
                        }),
                    }
                }
                OperandType::FuncPtr => {
                    let Operand::Symb { text, idx } = op else {
                        self.err(103, format!("operand format for {mnem}"));
                        continue;
                    };
                    match self.sym_functors.get(text) {
                        Some(base) => {
                            self.runtime.code.get_mut(ptr).iptr = Ipoint::make(base + idx, 0);
                        }
                        None => self.err(107, format!("functor undefined: {text}")),
                    }
                }
            }
        }
    }

    fn compile_fork(&mut self, ops: &[Operand]) {
        let ptr = self.runtime.code.allocate();
        let (Some(Operand::Symb { text: dest, idx: 0 }), Some(Operand::Symb { text: scope, .. })) =
            (ops.first(), ops.get(1))
        else {
            self.err(103, "%fork expects a code label and a scope");
            return;
        };
        if ops.len() != 2 {
            self.err(102, "operand count for %fork");
            return;
        }
        let Some(sh) = self.sym_vpi.get(scope) else {
            self.err(109, format!("unknown scope: {scope}"));
            return;
        };
        if !self.runtime.vpi.is_scope(sh) {
            self.err(109, format!("not a scope: {scope}"));
            return;
        }
        let cptr = self.sym_codespace.get(dest).unwrap_or(CodePtr::NULL);
        {
            let code = self.runtime.code.get_mut(ptr);
            code.opcode = Opcode::Fork;
            code.fork = Some(Box::new(ForkExtend { cptr, scope: sh }));
        }
        if cptr.is_null() {
            self.cresolv_list.push(CodeResolv {
                at: ptr,
                slot: CodeSlot::ForkCptr,
                label: dest.clone(),
            });
        }
    }

    fn compile_disable(&mut self, ops: &[Operand]) {
        let ptr = self.runtime.code.allocate();
        let Some(Operand::Symb { text, .. }) = ops.first() else {
            self.err(103, "%disable expects a scope symbol");
            return;
        };
        if ops.len() != 1 {
            self.err(102, "operand count for %disable");
            return;
        }
        match self.sym_vpi.get(text) {
            Some(h) if self.runtime.vpi.is_scope(h) => {
                let code = self.runtime.code.get_mut(ptr);
                code.opcode = Opcode::Disable;
                code.handle = Some(h);
            }
            _ => self.err(109, format!("unknown scope: {text}")),
        }
    }

    fn compile_vpi_call(&mut self, ops: &[Operand]) {
        let ptr = self.runtime.code.allocate();
        let Some(Operand::Str(name)) = ops.first() else {
            self.err(103, "%vpi_call expects a task name string");
            return;
        };
        if !self.runtime.tasks.contains(name) {
            self.err(108, format!("unknown system task: {name}"));
            return;
        }
        let mut args = Vec::new();
        for op in &ops[1..] {
            let handle = match op {
                Operand::Str(s) => self.runtime.vpi.register(VpiObject::Str(s.clone())),
                Operand::Number(n) => {
                    if *n < 0 {
                        self.err(103, "negative %vpi_call argument");
                        continue;
                    }
                    self.runtime.vpi.register(VpiObject::Number(*n as u64))
                }
                Operand::Symb { text, .. } => match self.sym_vpi.get(text) {
                    Some(h) => h,
                    None => {
                        self.err(109, format!("unknown VPI symbol: {text}"));
                        continue;
                    }
                },
            };
            args.push(handle);
        }
        let handle = self.runtime.vpi.register(VpiObject::SysTaskCall {
            name: name.clone(),
            args,
        });
        let code = self.runtime.code.get_mut(ptr);
        code.opcode = Opcode::VpiCall;
        code.handle = Some(handle);
    }

    /// Resolves the deferred-fixup lists to a fixed point and reports
    /// each residual entry once.
    pub fn compile_cleanup(&mut self) {
        loop {
            let mut progressed = false;
            let mut remaining = Vec::new();
            for res in std::mem::take(&mut self.resolv_list) {
                match self.sym_functors.get(&res.source) {
                    Some(base) => {
                        self.runtime.functors.add_dest(base + res.idx, res.port);
                        progressed = true;
                    }
                    None => remaining.push(res),
                }
            }
            self.resolv_list = remaining;
            if !progressed || self.resolv_list.is_empty() {
                break;
            }
        }
        for res in &self.resolv_list {
            self.sink.emit(Diagnostic::error(
                DiagnosticCode::error(201),
                format!("unresolved functor source: {}", res.source),
                SourceLoc::NONE,
            ));
        }

        loop {
            let mut progressed = false;
            let mut remaining = Vec::new();
            for res in std::mem::take(&mut self.cresolv_list) {
                match self.sym_codespace.get(&res.label) {
                    Some(target) => {
                        let code = self.runtime.code.get_mut(res.at);
                        match res.slot {
                            CodeSlot::Cptr => code.cptr = target,
                            CodeSlot::ForkCptr => {
                                if let Some(fork) = code.fork.as_mut() {
                                    fork.cptr = target;
                                }
                            }
                        }
                        progressed = true;
                    }
                    None => remaining.push(res),
                }
            }
            self.cresolv_list = remaining;
            if !progressed || self.cresolv_list.is_empty() {
                break;
            }
        }
        for res in &self.cresolv_list {
            self.sink.emit(Diagnostic::error(
                DiagnosticCode::error(202),
                format!("unresolved code label: {}", res.label),
                SourceLoc::NONE,
            ));
        }
    }

    /// The label covering a functor index, as `label` or `label[bit]`.
    fn functor_ref_text(&self, index: u32) -> String {
        for (base, count, label) in &self.functor_spans {
            if index >= *base && index < base + count {
                let off = index - base;
                if off == 0 {
                    return label.clone();
                }
                return format!("{label}[{off}]");
            }
        }
        format!("<f{index}>")
    }

    fn code_label_text(&self, ptr: CodePtr) -> String {
        for (label, value) in self.sym_codespace.iter() {
            if value == ptr {
                return label.to_string();
            }
        }
        format!("<c{}>", ptr.as_raw())
    }

    fn vpi_label_text(&self, handle: VpiRef) -> String {
        self.vpi_labels
            .get(&handle.as_raw())
            .cloned()
            .unwrap_or_else(|| format!("<v{}>", handle.as_raw()))
    }

    /// Renders one instruction back to assembly text.
    fn disassemble(&self, inst: &Instruction) -> String {
        match inst.opcode {
            Opcode::Fork => {
                let ext = inst.fork.as_ref().expect("fork without extension");
                format!(
                    "%fork {}, {}",
                    self.code_label_text(ext.cptr),
                    self.vpi_label_text(ext.scope)
                )
            }
            Opcode::Disable => {
                let handle = inst.handle.expect("%disable without handle");
                format!("%disable {}", self.vpi_label_text(handle))
            }
            Opcode::VpiCall => {
                let handle = inst.handle.expect("%vpi_call without handle");
                let VpiObject::SysTaskCall { name, args } = self.runtime.vpi.get(handle) else {
                    return "%vpi_call <bad>".to_string();
                };
                let mut text = format!("%vpi_call \"{}\"", escape(name));
                for &arg in args {
                    match self.runtime.vpi.get(arg) {
                        VpiObject::Str(s) => {
                            let _ = write!(text, ", \"{}\"", escape(s));
                        }
                        VpiObject::Number(n) => {
                            let _ = write!(text, ", {n}");
                        }
                        _ => {
                            let _ = write!(text, ", {}", self.vpi_label_text(arg));
                        }
                    }
                }
                text
            }
            op => {
                let entry = crate::codes::OPCODE_TABLE
                    .iter()
                    .find(|e| e.opcode == op)
                    .expect("opcode missing from table");
                let mut text = entry.mnemonic.to_string();
                for (i, ty) in entry.args.iter().take(entry.argc).enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    let _ = match ty {
                        OperandType::Bit1 => write!(text, "{sep}{}", inst.bit_idx1),
                        OperandType::Bit2 => write!(text, "{sep}{}", inst.bit_idx2),
                        OperandType::Number => write!(text, "{sep}{}", inst.number),
                        OperandType::CodePtr => {
                            write!(text, "{sep}{}", self.code_label_text(inst.cptr))
                        }
                        OperandType::FuncPtr => {
                            write!(text, "{sep}{}", self.functor_ref_text(inst.iptr.index()))
                        }
                        OperandType::None => Ok(()),
                    };
                }
                text
            }
        }
    }

    /// Re-serialises the compiled design as assembly text.
    ///
    /// After [`compile_cleanup`](Self::compile_cleanup) the output
    /// re-parses to an identical code space and functor graph.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        for h in &self.header_lines {
            let _ = writeln!(out, "{h}");
        }
        for d in &self.decl_lines {
            let _ = writeln!(out, "{d}");
        }
        // Group code labels by target.
        let mut labels_at: HashMap<u32, Vec<String>> = HashMap::new();
        for (label, ptr) in self.sym_codespace.iter() {
            labels_at
                .entry(ptr.as_raw())
                .or_default()
                .push(label.to_string());
        }
        for (ptr, inst) in self.runtime.code.iter() {
            if let Some(labels) = labels_at.get(&ptr.as_raw()) {
                for l in labels {
                    let _ = writeln!(out, "{l}:");
                }
            }
            let _ = writeln!(out, "    {}", self.disassemble(inst));
        }
        // Labels at the end of the tape.
        if let Some(labels) = labels_at.get(&(self.runtime.code.len() as u32)) {
            for l in labels {
                let _ = writeln!(out, "{l}:");
            }
        }
        for t in &self.thread_lines {
            let _ = writeln!(out, "{t}");
        }
        out
    }

    /// Renders the compiler state for debugging: symbol tables, the
    /// functor pool, unresolved inputs, and a code disassembly.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "FUNCTOR SYMBOL TABLE:");
        out.push_str(&self.sym_functors.dump());
        let _ = writeln!(out, "FUNCTORS:");
        for (idx, f) in self.runtime.functors.iter() {
            let mode = match &f.mode {
                FunctorMode::Table(t) => t.name().to_string(),
                FunctorMode::EdgeEvent { table, .. } => format!("event/{}", table.name()),
                FunctorMode::NamedEvent { .. } => "event".to_string(),
            };
            let _ = writeln!(
                out,
                "    {idx:08x}: {mode} ival={:#04x} oval={} out={:08x}",
                f.ival,
                f.oval,
                f.out.as_raw()
            );
        }
        let _ = writeln!(out, "UNRESOLVED PORT INPUTS:");
        for res in &self.resolv_list {
            let _ = writeln!(out, "    {:08x}: {}", res.port.as_raw(), res.source);
        }
        let _ = writeln!(out, "CODE SPACE SYMBOL TABLE:");
        out.push_str(&self.sym_codespace.dump());
        let _ = writeln!(out, "CODE SPACE DISASSEMBLY:");
        for (ptr, inst) in self.runtime.code.iter() {
            let _ = writeln!(out, "    {:04}: {}", ptr.as_raw(), self.disassemble(inst));
        }
        out
    }
}

/// Truncates a line at the first `#` outside a string literal.
fn strip_comment(line: &str) -> &str {
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' if in_str => escaped = !escaped,
            '"' if !escaped => in_str = !in_str,
            '#' if !in_str => return &line[..i],
            _ => escaped = false,
        }
    }
    line
}

/// Splits off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], &s[i..]),
        None => (s, ""),
    }
}

/// Finds the colon terminating a leading code label, if the line starts
/// with one. The colon must follow the label directly.
fn find_label_colon(s: &str) -> Option<usize> {
    for (i, c) in s.char_indices() {
        match c {
            ':' if i > 0 => return Some(i),
            c if c.is_alphanumeric() || c == '_' || c == '$' || c == '.' => {}
            _ => return None,
        }
    }
    None
}

/// True for a bare identifier usable as a label.
fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.')
        && !s.chars().next().unwrap().is_ascii_digit()
}

/// Splits a comma-separated list, respecting string literals.
fn split_commas(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_str = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            '\\' if in_str => escaped = !escaped,
            '"' if !escaped => in_str = !in_str,
            ',' if !in_str => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => escaped = false,
        }
    }
    out.push(&s[start..]);
    out
}

/// Parses one operand token.
fn parse_operand(tok: &str) -> Option<Operand> {
    if let Some(rest) = tok.strip_prefix('"') {
        let body = rest.strip_suffix('"')?;
        return Some(Operand::Str(unescape(body)?));
    }
    if tok.chars().next()?.is_ascii_digit() || tok.starts_with('-') {
        return tok.parse::<i64>().ok().map(Operand::Number);
    }
    // Symbol with optional [idx].
    if let Some(open) = tok.find('[') {
        let name = &tok[..open];
        let idx = tok[open + 1..].strip_suffix(']')?;
        if !is_ident(name) {
            return None;
        }
        return idx
            .parse::<u32>()
            .ok()
            .map(|idx| Operand::Symb {
                text: name.to_string(),
                idx,
            });
    }
    if is_ident(tok) {
        return Some(Operand::Symb {
            text: tok.to_string(),
            idx: 0,
        });
    }
    None
}

/// The canonical text of an operand.
fn operand_text(op: &Operand) -> String {
    match op {
        Operand::Number(n) => n.to_string(),
        Operand::Str(s) => format!("\"{}\"", escape(s)),
        Operand::Symb { text, idx } => {
            if *idx == 0 {
                text.clone()
            } else {
                format!("{text}[{idx}]")
            }
        }
    }
}

/// Escapes a string for re-emission.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

/// Unescapes a string literal body.
fn unescape(s: &str) -> Option<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            _ => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vpi::{TaskAction, TaskContext};
    use crate::vthread::ThreadState;

    fn compile(text: &str) -> Compiler {
        let mut c = Compiler::new("test.vvm");
        c.compile_string(text);
        c.compile_cleanup();
        c
    }

    #[test]
    fn parse_operand_forms() {
        assert_eq!(parse_operand("42"), Some(Operand::Number(42)));
        assert_eq!(parse_operand("-3"), Some(Operand::Number(-3)));
        assert_eq!(
            parse_operand("\"hi\\n\""),
            Some(Operand::Str("hi\n".into()))
        );
        assert_eq!(
            parse_operand("f2[3]"),
            Some(Operand::Symb {
                text: "f2".into(),
                idx: 3
            })
        );
        assert_eq!(
            parse_operand("f2"),
            Some(Operand::Symb {
                text: "f2".into(),
                idx: 0
            })
        );
        assert_eq!(parse_operand("f2["), None);
        assert_eq!(parse_operand("\"open"), None);
    }

    #[test]
    fn comments_and_blank_lines() {
        let c = compile("# a comment\n\n   # another\n");
        assert_eq!(c.error_count(), 0);
        assert!(c.runtime().code.is_empty());
    }

    #[test]
    fn functor_declaration_links_inputs() {
        let c = compile("f2 .functor OR, 0\nf1 .functor AND, 0, f2, f2\n");
        assert_eq!(c.error_count(), 0);
        let f2 = c.sym_functors.get("f2").unwrap();
        let f1 = c.sym_functors.get("f1").unwrap();
        let chain: Vec<Ipoint> = c.runtime().functors.out_chain(f2).collect();
        assert_eq!(chain.len(), 2);
        assert!(chain.iter().all(|ip| ip.index() == f1));
    }

    #[test]
    fn forward_referenced_ports_resolve_at_cleanup() {
        // S4: f1 references f2 before it is defined. After cleanup both
        // of f1's ports sit on f2's out chain, and f2's chain reaches f1
        // exactly twice.
        let c = compile("f1 .functor AND, 0, f2[0], f2[0]\nf2 .functor OR, 0\n");
        assert_eq!(c.error_count(), 0);
        let f1 = c.sym_functors.get("f1").unwrap();
        let f2 = c.sym_functors.get("f2").unwrap();
        let chain: Vec<Ipoint> = c.runtime().functors.out_chain(f2).collect();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.iter().filter(|ip| ip.index() == f1).count(), 2);
        let ports: Vec<u32> = chain.iter().map(|ip| ip.port()).collect();
        assert!(ports.contains(&0));
        assert!(ports.contains(&1));
    }

    #[test]
    fn unresolved_functor_source_reported() {
        let c = compile("f1 .functor AND, 0, ghost\n");
        assert_eq!(c.error_count(), 1);
        let diags = c.diagnostics();
        assert!(diags[0].message.contains("ghost"));
    }

    #[test]
    fn unresolved_code_label_reported() {
        // S5: a jump to a label that never appears.
        let c = compile("start: %jmp later\n    %end\n");
        assert!(c.error_count() >= 1);
        assert!(c
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("later")));
        assert!(matches!(
            c.into_runtime(),
            Err(VvmError::CompileErrors { .. })
        ));
    }

    #[test]
    fn backward_code_label_resolves_inline() {
        let c = compile("top: %noop\n    %jmp top\n");
        assert_eq!(c.error_count(), 0);
        let top = c.sym_codespace.get("top").unwrap();
        let (_, jmp) = c.runtime().code.iter().nth(1).unwrap();
        assert_eq!(jmp.cptr, top);
    }

    #[test]
    fn invalid_opcode_and_operand_errors() {
        let c = compile("%frobnicate 1\n%jmp 5\n%mov 8\n");
        // bad mnemonic, operand format, operand count.
        assert_eq!(c.error_count(), 3);
    }

    #[test]
    fn functor_redefinition_is_error() {
        let c = compile("f .functor AND, 0\nf .functor OR, 0\n");
        assert_eq!(c.error_count(), 1);
    }

    #[test]
    fn invalid_functor_type_is_error() {
        let c = compile("f .functor MAJ3, 0\n");
        assert_eq!(c.error_count(), 1);
    }

    #[test]
    fn var_allocates_vector_and_vpi_handle() {
        let c = compile("v .var \"count\", 7, 0, signed\n");
        assert_eq!(c.error_count(), 0);
        let base = c.sym_functors.get("v").unwrap();
        // 8 contiguous var functors.
        for i in 0..8 {
            assert!(matches!(
                c.runtime().functors.get(base + i).mode,
                FunctorMode::Table(FunctorTable::Var)
            ));
        }
        let h = c.sym_vpi.get("v").unwrap();
        match c.runtime().vpi.get(h) {
            VpiObject::Reg {
                name,
                msb,
                lsb,
                signed,
                base: b,
            } => {
                assert_eq!(name, "count");
                assert_eq!((*msb, *lsb), (7, 0));
                assert!(*signed);
                assert_eq!(*b, base);
            }
            other => panic!("expected Reg, got {other:?}"),
        }
    }

    #[test]
    fn net_wires_sources_per_bit() {
        let text = "\
a .var \"a\", 1, 0
n .net \"n\", 1, 0, a[0], a[1]
";
        let c = compile(text);
        assert_eq!(c.error_count(), 0);
        let a = c.sym_functors.get("a").unwrap();
        let n = c.sym_functors.get("n").unwrap();
        let chain_a0: Vec<Ipoint> = c.runtime().functors.out_chain(a).collect();
        assert_eq!(chain_a0, vec![Ipoint::make(n, 0)]);
        let chain_a1: Vec<Ipoint> = c.runtime().functors.out_chain(a + 1).collect();
        assert_eq!(chain_a1, vec![Ipoint::make(n + 1, 0)]);
    }

    #[test]
    fn net_source_count_mismatch() {
        let c = compile("a .var \"a\", 1, 0\nn .net \"n\", 3, 0, a[0], a[1]\n");
        assert_eq!(c.error_count(), 1);
    }

    #[test]
    fn event_or_collects_named_events() {
        let text = "\
e1 .event \"go1\"
e2 .event \"go2\"
eo .event/or e1, e2
";
        let c = compile(text);
        assert_eq!(c.error_count(), 0);
        let e1 = c.sym_functors.get("e1").unwrap();
        let eo = c.sym_functors.get("eo").unwrap();
        let chain: Vec<Ipoint> = c.runtime().functors.out_chain(e1).collect();
        assert_eq!(chain, vec![Ipoint::make(eo, 0)]);
    }

    #[test]
    fn event_or_requires_defined_sources() {
        let c = compile("eo .event/or ghost\n");
        assert_eq!(c.error_count(), 1);
    }

    #[test]
    fn scope_and_thread_and_fork_run() {
        // S6 as assembly text: time advances to 5 exactly once, and the
        // parent ends after both children.
        let text = "\
main .scope \"main\"
scopeA .scope \"scopeA\", main
start:
    %fork child, scopeA
    %fork child, scopeA
    %join
    %end
child:
    %delay 5
    %end
.thread start
";
        let c = compile(text);
        assert_eq!(c.error_count(), 0, "{:?}", c.diagnostics());
        let mut rt = c.into_runtime().unwrap();
        rt.run().unwrap();
        assert_eq!(rt.now(), 5);
        assert_eq!(rt.thread_count(), 3);
        for i in 0..3 {
            assert_eq!(
                rt.thread(crate::vthread::ThreadId::from_raw(i)).state,
                ThreadState::Dead
            );
        }
    }

    #[test]
    fn thread_requires_defined_start() {
        let c = compile(".thread nowhere\n");
        assert_eq!(c.error_count(), 1);
    }

    #[test]
    fn disable_needs_known_scope() {
        let c = compile("%disable ghost\n");
        assert_eq!(c.error_count(), 1);
    }

    struct Nop;
    impl SystemTask for Nop {
        fn invoke(&mut self, ctx: &mut TaskContext<'_>) -> TaskAction {
            let mut words = Vec::new();
            for &arg in ctx.args {
                match ctx.registry.get(arg) {
                    VpiObject::Str(s) => words.push(s.clone()),
                    VpiObject::Number(n) => words.push(n.to_string()),
                    VpiObject::Reg { name, .. } => words.push(name.clone()),
                    _ => {}
                }
            }
            ctx.output.push(words.join(" "));
            TaskAction::Done
        }
    }

    #[test]
    fn vpi_call_known_task_compiles_and_runs() {
        let mut c = Compiler::new("t.vvm");
        c.register_task("$display", Box::new(Nop));
        c.compile_string(
            "v .var \"v\", 0, 0\nstart: %vpi_call \"$display\", \"hi\", 7, v\n    %end\n.thread start\n",
        );
        c.compile_cleanup();
        assert_eq!(c.error_count(), 0, "{:?}", c.diagnostics());
        let mut rt = c.into_runtime().unwrap();
        rt.run().unwrap();
        assert_eq!(rt.output, vec!["hi 7 v"]);
    }

    #[test]
    fn vpi_call_unknown_task_is_compile_error() {
        let c = compile("start: %vpi_call \"$missing\"\n    %end\n");
        assert_eq!(c.error_count(), 1);
        assert!(c
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("$missing")));
    }

    #[test]
    fn module_headers_install_tasks() {
        let mut c = Compiler::new("t.vvm");
        c.register_module(
            "system",
            Box::new(|rt: &mut Runtime| {
                rt.tasks.register("$display", Box::new(Nop));
            }),
        );
        c.compile_string(":module \"system\"\nstart: %vpi_call \"$display\"\n    %end\n");
        c.compile_cleanup();
        assert_eq!(c.error_count(), 0);
    }

    #[test]
    fn unknown_module_is_error() {
        let c = compile(":module \"nope\"\n");
        assert_eq!(c.error_count(), 1);
    }

    #[test]
    fn full_program_simulates() {
        // A var driving a posedge event; a waiter and a driver thread.
        let text = "\
main .scope \"main\"
clk .var \"clk\", 0, 0
ev .event posedge, clk
waiter:
    %wait ev
    %mov 8, 1, 1
    %end
driver:
    %delay 4
    %set clk, 1
    %end
.thread waiter
.thread driver
";
        let c = compile(text);
        assert_eq!(c.error_count(), 0, "{:?}", c.diagnostics());
        let mut rt = c.into_runtime().unwrap();
        rt.run().unwrap();
        assert_eq!(rt.now(), 4);
        let waiter = crate::vthread::ThreadId::from_raw(0);
        assert_eq!(rt.thread(waiter).get_bit(8), 1);
    }

    #[test]
    fn round_trip_reparses_identically() {
        let text = "\
main .scope \"main\"
v .var \"value\", 3, 0
f2 .functor OR, 0
f1 .functor AND, 0, f2, v[2]
ev .event negedge, f2
start:
    %mov 8, 1, 4
    %set v, 8
    %jmp/0 start, 9
    %end
.thread start
";
        let a = compile(text);
        assert_eq!(a.error_count(), 0, "{:?}", a.diagnostics());
        let serialized = a.serialize();
        let b = compile(&serialized);
        assert_eq!(b.error_count(), 0, "{serialized}\n{:?}", b.diagnostics());

        // Identical functor graphs.
        assert_eq!(a.runtime().functors.len(), b.runtime().functors.len());
        for (idx, fa) in a.runtime().functors.iter() {
            let fb = b.runtime().functors.get(idx);
            assert_eq!(fa, fb, "functor {idx} differs after round trip");
        }
        // Identical code spaces.
        assert_eq!(a.runtime().code.len(), b.runtime().code.len());
        for (ptr, ia) in a.runtime().code.iter() {
            let ib = b.runtime().code.get(ptr);
            assert_eq!(ia, ib, "instruction {} differs", ptr.as_raw());
        }
        // Identical symbol tables.
        assert_eq!(
            a.sym_functors.iter().collect::<Vec<_>>(),
            b.sym_functors.iter().collect::<Vec<_>>()
        );
        assert_eq!(
            a.sym_codespace.iter().collect::<Vec<_>>(),
            b.sym_codespace.iter().collect::<Vec<_>>()
        );
    }

    #[test]
    fn dump_mentions_sections() {
        let c = compile("f .functor AND, 0\nstart: %end\n");
        let text = c.dump();
        assert!(text.contains("FUNCTOR SYMBOL TABLE:"));
        assert!(text.contains("CODE SPACE DISASSEMBLY:"));
        assert!(text.contains("%end"));
    }
}
