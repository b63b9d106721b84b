//! Runtime prelude emitted at the top of every non-empty compiled unit.
//!
//! The prelude defines the per-fragment namespace records and the helpers
//! generated code calls. All helper names carry the reserved `__fl_` prefix.
//! The prelude only uses `const` bindings, so once the sandbox wraps the unit
//! in a function nothing here leaks into the global scope.

/// Namespace records, keyed by fragment id.
pub const FRAGMENTS: &str = "__fl_fragments";
/// `__fl_record(id)`: a fragment's record, or an empty object if it has not
/// been emitted yet (cycles) or never will be (missing fragments).
pub const RECORD: &str = "__fl_record";
/// `__fl_import(id, name)`: one export of a fragment.
pub const IMPORT: &str = "__fl_import";
/// `__fl_default(module)`: the default export of a record or CommonJS module.
pub const DEFAULT: &str = "__fl_default";
/// `__fl_read(thunk)`: the thunk's value, or `undefined` if reading throws
/// (an undeclared binding or one still in its temporal dead zone).
pub const READ: &str = "__fl_read";
/// `__fl_export(record, name, thunk)`: stores the value only if it is a function.
pub const EXPORT: &str = "__fl_export";
/// Like [`EXPORT`] but also assigns `globalThis[name]` (last writer wins).
pub const EXPORT_GLOBAL: &str = "__fl_export_global";
/// `__fl_export_all(record, source, exporter)`: star re-export.
pub const EXPORT_ALL: &str = "__fl_export_all";
/// `__fl_invoke(id, name)`: awaits the entry export of the entry fragment.
pub const INVOKE: &str = "__fl_invoke";

/// Wrapper-local holder of a fragment's record; never visible to the body's
/// own `module` binding.
pub const MODULE: &str = "__fl_module";
/// Wrapper-local hoist closure, run after the fragment body ends.
pub const HOIST: &str = "__fl_hoist";

/// The prelude source.
pub const PRELUDE: &str = r#"const __fl_fragments = Object.create(null);
const __fl_record = (id) => __fl_fragments[id] ?? Object.create(null);
const __fl_import = (id, name) => __fl_record(id)[name];
const __fl_default = (m) =>
  m !== null && typeof m === "object" && "default" in m ? m.default : m;
const __fl_read = (thunk) => {
  try {
    return thunk();
  } catch (_) {
    return undefined;
  }
};
const __fl_export = (record, name, thunk) => {
  const value = __fl_read(thunk);
  if (typeof value === "function") {
    record[name] = value;
  }
};
const __fl_export_global = (record, name, thunk) => {
  const value = __fl_read(thunk);
  if (typeof value === "function") {
    record[name] = value;
    globalThis[name] = value;
  }
};
const __fl_export_all = (record, source, exporter) => {
  if (source === null || source === undefined) {
    return;
  }
  for (const name of Object.keys(source)) {
    if (name !== "default") {
      exporter(record, name, () => source[name]);
    }
  }
};
const __fl_invoke = async (id, name) => {
  const target = __fl_import(id, name);
  if (typeof target !== "function") {
    throw new TypeError(`entry export '${name}' of fragment '${id}' is not a function`);
  }
  return await target();
};
"#;
