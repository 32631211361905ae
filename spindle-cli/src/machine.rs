//! Stack machine that runs instruction tapes through the client API.
//!
//! Every instruction works on one of three read targets, chosen by its
//! suffix: the current transaction (no suffix), a snapshot view of it
//! (`_SNAPSHOT`) or the database itself (`_DATABASE`), where each call runs
//! in its own retried transaction. Client errors do not stop the machine:
//! they are pushed as `ERROR(code)` items, just like failed futures are
//! when they are popped.

use crate::script::{Instruction, Operand};
use bytes::Bytes;
use serde::Serialize;
use spindle_client::{
    Database, Error as ClientError, FutureKey, FutureNil, FutureValue, KeyRange, KeySelector,
    KeyValue, MutationType, Range, RangeOptions, ReadTransaction, SelectorRange, Snapshot,
    StreamingMode, Transaction,
};
use thiserror::Error;
use tracing::debug;

const RESULT_NOT_PRESENT: &[u8] = b"RESULT_NOT_PRESENT";

/// Failures that stop the machine. Client errors never do.
#[derive(Error, Debug)]
pub enum MachineError {
    #[error("Instruction {index} ({op}): stack is empty")]
    StackUnderflow { index: usize, op: String },

    #[error("Instruction {index} ({op}): expected {expected}, found {found}")]
    TypeMismatch {
        index: usize,
        op: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Instruction {index}: unknown operation {op}")]
    UnknownOperation { index: usize, op: String },

    #[error("Instruction {index} ({op}): {message}")]
    InvalidArgument {
        index: usize,
        op: String,
        message: String,
    },
}

/// A value on the stack.
#[derive(Debug, Clone)]
pub enum Item {
    Int(i64),
    Bytes(Bytes),
    Null,
    Value(FutureValue),
    Key(FutureKey),
    Nil(FutureNil),
    Range(Vec<KeyValue>),
    Error(i32),
}

impl Item {
    fn kind(&self) -> &'static str {
        match self {
            Item::Int(_) => "integer",
            Item::Bytes(_) => "bytes",
            Item::Null => "null",
            Item::Value(_) | Item::Key(_) | Item::Nil(_) => "future",
            Item::Range(_) => "range",
            Item::Error(_) => "error",
        }
    }

    fn not_present() -> Self {
        Item::Bytes(Bytes::from_static(RESULT_NOT_PRESENT))
    }

    fn text(text: &'static str) -> Self {
        Item::Bytes(Bytes::from_static(text.as_bytes()))
    }

    fn value(value: Option<Bytes>) -> Self {
        value.map_or_else(Item::not_present, Item::Bytes)
    }

    /// Waits for a future item and replaces it with its result.
    fn resolve(self) -> Self {
        let resolved = match self {
            Item::Value(future) => future.get().map(Item::value),
            Item::Key(future) => future.get().map(Item::Bytes),
            Item::Nil(future) => future.get().map(|()| Item::not_present()),
            other => Ok(other),
        };
        resolved.unwrap_or_else(|err| Item::Error(err.code()))
    }
}

/// Operations the machine understands, without target suffixes.
pub const OPERATIONS: &[&str] = &[
    "PUSH",
    "DUP",
    "EMPTY_STACK",
    "SWAP",
    "POP",
    "SUB",
    "NEW_TRANSACTION",
    "ON_ERROR",
    "GET_READ_VERSION",
    "SET_READ_VERSION",
    "GET_COMMITTED_VERSION",
    "GET",
    "GET_KEY",
    "GET_RANGE",
    "GET_RANGE_STARTS_WITH",
    "GET_RANGE_SELECTOR",
    "SET",
    "CLEAR",
    "CLEAR_RANGE",
    "CLEAR_RANGE_STARTS_WITH",
    "ATOMIC_OP",
    "READ_CONFLICT_RANGE",
    "WRITE_CONFLICT_RANGE",
    "READ_CONFLICT_KEY",
    "WRITE_CONFLICT_KEY",
    "COMMIT",
    "RESET",
    "CANCEL",
    "WAIT_FUTURE",
];

/// Whether `op`, with or without a target suffix, is a known operation.
pub fn is_known_operation(op: &str) -> bool {
    let base = op
        .strip_suffix("_SNAPSHOT")
        .or_else(|| op.strip_suffix("_DATABASE"))
        .unwrap_or(op);
    OPERATIONS.contains(&base)
}

/// Display form of a resolved stack item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Rendered {
    Int(i64),
    Bytes(String),
    Null,
    Range(Vec<(String, String)>),
    Error(i32),
}

impl std::fmt::Display for Rendered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rendered::Int(i) => write!(f, "{}", i),
            Rendered::Bytes(b) => write!(f, "\"{}\"", b),
            Rendered::Null => write!(f, "null"),
            Rendered::Range(pairs) => {
                let pairs: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("\"{}\": \"{}\"", k, v))
                    .collect();
                write!(f, "[{}]", pairs.join(", "))
            }
            Rendered::Error(code) => write!(f, "ERROR({})", code),
        }
    }
}

/// Escapes non-printable bytes the way byte string literals are written.
pub fn printable(bytes: &[u8]) -> String {
    bytes
        .iter()
        .flat_map(|&b| std::ascii::escape_default(b))
        .map(char::from)
        .collect()
}

fn render(item: Item) -> Rendered {
    match item.resolve() {
        Item::Int(i) => Rendered::Int(i),
        Item::Bytes(b) => Rendered::Bytes(printable(&b)),
        Item::Range(kvs) => Rendered::Range(
            kvs.iter()
                .map(|kv| (printable(&kv.key), printable(&kv.value)))
                .collect(),
        ),
        Item::Error(code) => Rendered::Error(code),
        _ => Rendered::Null,
    }
}

/// One entry of the final stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackEntry {
    /// Index of the instruction that pushed the item.
    pub instruction: usize,
    pub item: Rendered,
}

struct Entry {
    item: Item,
    index: usize,
}

/// Where a read goes.
pub enum ReadTarget {
    Database(Database),
    Transaction(Transaction),
    Snapshot(Snapshot),
}

impl ReadTarget {
    fn get(&self, key: &[u8]) -> Result<Item, ClientError> {
        match self {
            ReadTarget::Database(db) => db.get(key).map(Item::value),
            ReadTarget::Transaction(tr) => Ok(Item::Value(tr.get(key))),
            ReadTarget::Snapshot(snapshot) => Ok(Item::Value(snapshot.get(key))),
        }
    }

    fn get_key(&self, selector: &KeySelector) -> Result<Item, ClientError> {
        match self {
            ReadTarget::Database(db) => db.get_key(selector).map(Item::Bytes),
            ReadTarget::Transaction(tr) => Ok(Item::Key(tr.get_key(selector))),
            ReadTarget::Snapshot(snapshot) => Ok(Item::Key(snapshot.get_key(selector))),
        }
    }

    fn get_range<R: Range>(&self, range: &R, options: RangeOptions) -> Result<Item, ClientError> {
        let kvs = match self {
            ReadTarget::Database(db) => db.get_range(range, options)?,
            ReadTarget::Transaction(tr) => tr.get_range(range, options).get_slice()?,
            ReadTarget::Snapshot(snapshot) => snapshot.get_range(range, options).get_slice()?,
        };
        Ok(Item::Range(kvs))
    }

    fn get_range_starts_with(
        &self,
        prefix: &[u8],
        options: RangeOptions,
    ) -> Result<Item, ClientError> {
        let kvs = match self {
            ReadTarget::Database(db) => db.get_range_starts_with(prefix, options)?,
            ReadTarget::Transaction(tr) => tr.get_range_starts_with(prefix, options)?.get_slice()?,
            ReadTarget::Snapshot(snapshot) => {
                snapshot.get_range_starts_with(prefix, options)?.get_slice()?
            }
        };
        Ok(Item::Range(kvs))
    }

    fn get_read_version(&self) -> Result<i64, ClientError> {
        match self {
            ReadTarget::Database(db) => db.transact(|tr| tr.get_read_version().get()),
            ReadTarget::Transaction(tr) => tr.get_read_version().get(),
            ReadTarget::Snapshot(snapshot) => snapshot.get_read_version().get(),
        }
    }
}

/// Runs instructions against one database and one current transaction.
pub struct StackMachine {
    db: Database,
    tr: Transaction,
    stack: Vec<Entry>,
    last_version: i64,
}

impl StackMachine {
    pub fn new(db: Database) -> Result<Self, ClientError> {
        let tr = db.create_transaction()?;
        Ok(Self {
            db,
            tr,
            stack: Vec::new(),
            last_version: 0,
        })
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn run(&mut self, instructions: &[Instruction]) -> Result<(), MachineError> {
        for (index, instruction) in instructions.iter().enumerate() {
            self.step(index, instruction)?;
        }
        Ok(())
    }

    /// Resolves every remaining item, bottom of the stack first.
    pub fn finish(self) -> Vec<StackEntry> {
        self.stack
            .into_iter()
            .map(|entry| StackEntry {
                instruction: entry.index,
                item: render(entry.item),
            })
            .collect()
    }

    pub fn step(&mut self, index: usize, instruction: &Instruction) -> Result<(), MachineError> {
        debug!(index, op = %instruction.op, depth = self.stack.len(), "Executing instruction");
        let ctx = Ctx {
            index,
            op: &instruction.op,
        };
        match self.execute(&ctx, instruction) {
            Ok(()) => Ok(()),
            Err(Failure::Client(err)) => {
                debug!(index, code = err.code(), "Instruction failed");
                self.store(index, Item::Error(err.code()));
                Ok(())
            }
            Err(Failure::Machine(err)) => Err(err),
        }
    }

    fn store(&mut self, index: usize, item: Item) {
        self.stack.push(Entry { item, index });
    }

    fn pop(&mut self, ctx: &Ctx) -> Result<Entry, MachineError> {
        self.stack.pop().ok_or_else(|| ctx.underflow())
    }

    fn wait_and_pop(&mut self, ctx: &Ctx) -> Result<Item, MachineError> {
        Ok(self.pop(ctx)?.item.resolve())
    }

    fn pop_bytes(&mut self, ctx: &Ctx) -> Result<Bytes, MachineError> {
        match self.wait_and_pop(ctx)? {
            Item::Bytes(b) => Ok(b),
            other => Err(ctx.mismatch("bytes", &other)),
        }
    }

    fn pop_int(&mut self, ctx: &Ctx) -> Result<i64, MachineError> {
        match self.wait_and_pop(ctx)? {
            Item::Int(i) => Ok(i),
            other => Err(ctx.mismatch("integer", &other)),
        }
    }

    fn pop_bool(&mut self, ctx: &Ctx) -> Result<bool, MachineError> {
        Ok(self.pop_int(ctx)? != 0)
    }

    fn pop_selector(&mut self, ctx: &Ctx) -> Result<KeySelector, MachineError> {
        let key = self.pop_bytes(ctx)?;
        let or_equal = self.pop_bool(ctx)?;
        let offset = self.pop_int(ctx)?;
        let offset =
            i32::try_from(offset).map_err(|_| ctx.invalid("selector offset out of range"))?;
        Ok(KeySelector::new(key, or_equal, offset))
    }

    /// Pops limit, reverse flag and streaming mode, in that order. A
    /// non-integer limit means no limit.
    fn pop_range_options(&mut self, ctx: &Ctx) -> Result<RangeOptions, MachineError> {
        let limit = match self.wait_and_pop(ctx)? {
            Item::Int(limit) => {
                usize::try_from(limit).map_err(|_| ctx.invalid("negative range limit"))?
            }
            _ => 0,
        };
        let reverse = self.pop_bool(ctx)?;
        let code = self.pop_int(ctx)?;
        let mode = i32::try_from(code)
            .ok()
            .and_then(StreamingMode::from_code)
            .ok_or_else(|| ctx.invalid("unknown streaming mode"))?;
        Ok(RangeOptions::new()
            .with_limit(limit)
            .with_reverse(reverse)
            .with_mode(mode))
    }

    fn execute(&mut self, ctx: &Ctx, instruction: &Instruction) -> Result<(), Failure> {
        let index = ctx.index;
        let (op, target) = if let Some(op) = instruction.op.strip_suffix("_SNAPSHOT") {
            (op, ReadTarget::Snapshot(self.tr.snapshot()))
        } else if let Some(op) = instruction.op.strip_suffix("_DATABASE") {
            (op, ReadTarget::Database(self.db.clone()))
        } else {
            (instruction.op.as_str(), ReadTarget::Transaction(self.tr.clone()))
        };

        match op {
            "PUSH" => {
                let item = match &instruction.arg {
                    None => Item::Null,
                    Some(Operand::Int(i)) => Item::Int(*i),
                    Some(Operand::Text(text)) => {
                        Item::Bytes(Bytes::copy_from_slice(text.as_bytes()))
                    }
                    Some(Operand::Hex { hex }) => Item::Bytes(
                        Operand::hex_bytes(hex).map_err(|e| ctx.invalid(&e.to_string()))?,
                    ),
                };
                self.store(index, item);
            }
            "DUP" => {
                let entry = self.stack.last().ok_or_else(|| ctx.underflow())?;
                let (item, from) = (entry.item.clone(), entry.index);
                self.store(from, item);
            }
            "EMPTY_STACK" => self.stack.clear(),
            "SWAP" => {
                let depth = self.pop_int(ctx)?;
                let len = self.stack.len();
                let other = usize::try_from(depth)
                    .ok()
                    .filter(|&d| d < len)
                    .ok_or_else(|| ctx.underflow())?;
                self.stack.swap(len - 1, len - 1 - other);
            }
            "POP" => {
                self.pop(ctx)?;
            }
            "SUB" => {
                let a = self.pop_int(ctx)?;
                let b = self.pop_int(ctx)?;
                self.store(index, Item::Int(a.wrapping_sub(b)));
            }
            "NEW_TRANSACTION" => {
                self.tr = self.db.create_transaction()?;
            }
            "ON_ERROR" => {
                let code = self.pop_int(ctx)?;
                let code = i32::try_from(code).map_err(|_| ctx.invalid("error code out of range"))?;
                let future = self.tr.on_error(&ClientError::engine(code));
                self.store(index, Item::Nil(future));
            }
            "GET_READ_VERSION" => {
                self.last_version = target.get_read_version()?;
                self.store(index, Item::text("GOT_READ_VERSION"));
            }
            "SET_READ_VERSION" => self.tr.set_read_version(self.last_version)?,
            "GET_COMMITTED_VERSION" => {
                self.last_version = self.tr.get_committed_version()?;
                self.store(index, Item::text("GOT_COMMITTED_VERSION"));
            }
            "GET" => {
                let key = self.pop_bytes(ctx)?;
                let item = target.get(&key)?;
                self.store(index, item);
            }
            "GET_KEY" => {
                let selector = self.pop_selector(ctx)?;
                let item = target.get_key(&selector)?;
                self.store(index, item);
            }
            "GET_RANGE" => {
                let begin = self.pop_bytes(ctx)?;
                let end = self.pop_bytes(ctx)?;
                let options = self.pop_range_options(ctx)?;
                let item = target.get_range(&KeyRange::new(begin, end), options)?;
                self.store(index, item);
            }
            "GET_RANGE_STARTS_WITH" => {
                let prefix = self.pop_bytes(ctx)?;
                let options = self.pop_range_options(ctx)?;
                let item = target.get_range_starts_with(&prefix, options)?;
                self.store(index, item);
            }
            "GET_RANGE_SELECTOR" => {
                let begin = self.pop_selector(ctx)?;
                let end = self.pop_selector(ctx)?;
                let options = self.pop_range_options(ctx)?;
                let item = target.get_range(&SelectorRange::new(begin, end), options)?;
                self.store(index, item);
            }
            "SET" => {
                let key = self.pop_bytes(ctx)?;
                let value = self.pop_bytes(ctx)?;
                self.write(ctx, &target, |w| w.set(&key, &value), |db| db.set(&key, &value))?;
            }
            "CLEAR" => {
                let key = self.pop_bytes(ctx)?;
                self.write(ctx, &target, |w| w.clear(&key), |db| db.clear(&key))?;
            }
            "CLEAR_RANGE" => {
                let range = KeyRange::new(self.pop_bytes(ctx)?, self.pop_bytes(ctx)?);
                self.write(
                    ctx,
                    &target,
                    |w| w.clear_range(&range),
                    |db| db.clear_range(&range),
                )?;
            }
            "CLEAR_RANGE_STARTS_WITH" => {
                let prefix = self.pop_bytes(ctx)?;
                self.write(
                    ctx,
                    &target,
                    |w| w.clear_range_starts_with(&prefix),
                    |db| db.clear_range_starts_with(&prefix),
                )?;
            }
            "ATOMIC_OP" => {
                let name = self.pop_bytes(ctx)?;
                let key = self.pop_bytes(ctx)?;
                let param = self.pop_bytes(ctx)?;
                let mutation = std::str::from_utf8(&name)
                    .ok()
                    .and_then(MutationType::from_name)
                    .ok_or_else(|| ctx.invalid(&format!("unknown mutation {}", printable(&name))))?;
                self.write(
                    ctx,
                    &target,
                    |w| w.atomic_op(&key, &param, mutation),
                    |db| db.transact(|tr| tr.atomic_op(&key, &param, mutation)),
                )?;
            }
            "READ_CONFLICT_RANGE" => {
                let range = KeyRange::new(self.pop_bytes(ctx)?, self.pop_bytes(ctx)?);
                self.tr.add_read_conflict_range(&range)?;
                self.store(index, Item::text("SET_CONFLICT_RANGE"));
            }
            "WRITE_CONFLICT_RANGE" => {
                let range = KeyRange::new(self.pop_bytes(ctx)?, self.pop_bytes(ctx)?);
                self.tr.add_write_conflict_range(&range)?;
                self.store(index, Item::text("SET_CONFLICT_RANGE"));
            }
            "READ_CONFLICT_KEY" => {
                let key = self.pop_bytes(ctx)?;
                self.tr.add_read_conflict_key(&key)?;
                self.store(index, Item::text("SET_CONFLICT_KEY"));
            }
            "WRITE_CONFLICT_KEY" => {
                let key = self.pop_bytes(ctx)?;
                self.tr.add_write_conflict_key(&key)?;
                self.store(index, Item::text("SET_CONFLICT_KEY"));
            }
            "COMMIT" => {
                let future = self.tr.commit();
                self.store(index, Item::Nil(future));
            }
            "RESET" => self.tr.reset()?,
            "CANCEL" => self.tr.cancel()?,
            "WAIT_FUTURE" => {
                let entry = self.pop(ctx)?;
                self.store(entry.index, entry.item.resolve());
            }
            _ => {
                return Err(Failure::Machine(MachineError::UnknownOperation {
                    index,
                    op: instruction.op.clone(),
                }))
            }
        }
        Ok(())
    }

    /// Applies a write to the current transaction, or to the database in its
    /// own transaction. Database writes push `RESULT_NOT_PRESENT`.
    fn write(
        &mut self,
        ctx: &Ctx,
        target: &ReadTarget,
        on_transaction: impl FnOnce(&Transaction) -> Result<(), ClientError>,
        on_database: impl FnOnce(&Database) -> Result<(), ClientError>,
    ) -> Result<(), Failure> {
        match target {
            ReadTarget::Transaction(tr) => on_transaction(tr)?,
            ReadTarget::Database(db) => {
                on_database(db)?;
                self.store(ctx.index, Item::not_present());
            }
            ReadTarget::Snapshot(_) => {
                return Err(Failure::Machine(ctx.invalid("writes cannot go through a snapshot")))
            }
        }
        Ok(())
    }
}

/// The instruction being executed, for error reports.
struct Ctx<'a> {
    index: usize,
    op: &'a str,
}

impl Ctx<'_> {
    fn underflow(&self) -> MachineError {
        MachineError::StackUnderflow {
            index: self.index,
            op: self.op.to_string(),
        }
    }

    fn mismatch(&self, expected: &'static str, found: &Item) -> MachineError {
        MachineError::TypeMismatch {
            index: self.index,
            op: self.op.to_string(),
            expected,
            found: found.kind(),
        }
    }

    fn invalid(&self, message: &str) -> MachineError {
        MachineError::InvalidArgument {
            index: self.index,
            op: self.op.to_string(),
            message: message.to_string(),
        }
    }
}

enum Failure {
    Client(ClientError),
    Machine(MachineError),
}

impl From<ClientError> for Failure {
    fn from(err: ClientError) -> Self {
        Failure::Client(err)
    }
}

impl From<MachineError> for Failure {
    fn from(err: MachineError) -> Self {
        Failure::Machine(err)
    }
}
