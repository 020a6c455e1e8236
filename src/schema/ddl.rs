//! Free functions building the DDL strings of spec.md §4.1, grounded on
//! `weetags/engine/sql.py`'s format-string templates (`CREATE_INDEX`,
//! `CREATE_EXTRACT_COLUMN`, `ADD_JSONLIST_TRIGGER`, `CREATE_TRIGGER`,
//! `DELETE_TRIGGER`) but expressed as functions rather than `.format()`
//! templates, since Rust has no named-placeholder string formatting.

pub fn create_index(table_name: &str, field_name: &str) -> String {
    format!("CREATE INDEX IF NOT EXISTS idx_{table_name}_{field_name} ON {table_name}({field_name});")
}

pub fn drop_table(table_name: &str) -> String {
    format!("DROP TABLE IF EXISTS {table_name};")
}

/// `ALTER TABLE ... ADD COLUMN <field>_<path> TEXT AS (json_extract(...))`.
/// A SQLite generated column is self-maintaining, so no insert/update
/// trigger is required to keep it in sync (see DESIGN.md for why this
/// resolves spec.md §4.1's trigger-for-a-generated-column wording).
pub fn add_json_extract_column(table_name: &str, field_name: &str, path: &str) -> String {
    format!(
        "ALTER TABLE {table_name} ADD COLUMN {field_name}_{col_path} TEXT AS (json_extract({field_name}, '$.{path}'));",
        col_path = path.replace('.', "_"),
    )
}

pub fn generated_column_name(field_name: &str, path: &str) -> String {
    format!("{field_name}_{}", path.replace('.', "_"))
}

/// Body shared by the insert and update triggers that keep a JSONLIST index
/// table in sync: expand `NEW.<field>` into `(value, nid, elm_idx)` rows.
fn expand_jsonlist_insert(index_table: &str, nodes_table: &str, field_name: &str) -> String {
    format!(
        "INSERT INTO {index_table}({field_name}, nid, elm_idx) \
         SELECT j.value, {nodes_table}.id, j.key FROM {nodes_table}, json_each(NEW.{field_name}) AS j \
         WHERE {nodes_table}.id = NEW.id;"
    )
}

/// `AFTER INSERT ON <nodes> ... expand NEW.<field>` (spec.md §4.1 bullet 1).
pub fn create_jsonlist_insert_trigger(tree_name: &str, nodes_table: &str, field_name: &str) -> String {
    let index_table = format!("{tree_name}__{field_name}");
    let body = expand_jsonlist_insert(&index_table, nodes_table, field_name);
    format!(
        "CREATE TRIGGER {tree_name}__{field_name}_insert_trigger AFTER INSERT ON {nodes_table} BEGIN\n{body}\nEND;"
    )
}

/// `AFTER UPDATE OF <field> ... delete all rows for OLD.id, reinsert from NEW`
/// (spec.md §4.1 bullet 2).
pub fn create_jsonlist_update_trigger(tree_name: &str, nodes_table: &str, field_name: &str) -> String {
    let index_table = format!("{tree_name}__{field_name}");
    let body = expand_jsonlist_insert(&index_table, nodes_table, field_name);
    format!(
        "CREATE TRIGGER {tree_name}__{field_name}_update_trigger AFTER UPDATE OF {field_name} ON {nodes_table} BEGIN\n\
         DELETE FROM {index_table} WHERE nid = OLD.id;\n{body}\nEND;"
    )
}

/// `AFTER DELETE ... delete all rows for OLD.id` (spec.md §4.1 bullet 3;
/// redundant with the table's own `ON DELETE CASCADE` but installed anyway
/// for parity with the spec's explicit trigger list).
pub fn create_jsonlist_delete_trigger(tree_name: &str, nodes_table: &str, field_name: &str) -> String {
    let index_table = format!("{tree_name}__{field_name}");
    format!(
        "CREATE TRIGGER {tree_name}__{field_name}_delete_trigger AFTER DELETE ON {nodes_table} BEGIN\n\
         DELETE FROM {index_table} WHERE nid = OLD.id;\nEND;"
    )
}

/// Back-fill an index table from nodes that already exist, used when an
/// index is installed after data has already been loaded (spec.md §4.5
/// stage 6: "JSONLIST ... create index table, back-fill from existing data").
pub fn backfill_jsonlist_index(tree_name: &str, nodes_table: &str, field_name: &str) -> String {
    let index_table = format!("{tree_name}__{field_name}");
    format!(
        "INSERT INTO {index_table}({field_name}, nid, elm_idx) \
         SELECT j.value, {nodes_table}.id, j.key FROM {nodes_table}, json_each({nodes_table}.{field_name}) AS j;"
    )
}
