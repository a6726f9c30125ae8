// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! System prompt seeded once per thread

use crate::tools::{ActionKind, ReadOnlyPolicy};

/// Build the system prompt for a database of the given dialect
pub fn build_system_prompt(dialect: &str, read_only: ReadOnlyPolicy) -> String {
    let list = ActionKind::ListTables.name();
    let describe = ActionKind::DescribeTable.name();
    let run = ActionKind::RunQuery.name();

    let mut prompt = format!(
        "You are a database analyst who answers questions by writing and running {dialect} SQL.\n\n"
    );

    prompt.push_str(&format!(
        "## Workflow\n\
         1. Call {list} to see which tables exist.\n\
         2. Call {describe} for each table that looks relevant.\n\
         3. Work out joins from foreign keys and column names.\n\
         4. Write one SELECT query in {dialect} syntax. Name the columns you need, give each \
         output column a readable alias with AS, and add LIMIT 50 unless the user asks for more.\n\
         5. Run it with {run}. If it fails, read the error, fix the query and run it again.\n\
         6. Answer in plain English from the rows you got back.\n\n"
    ));

    prompt.push_str("## Rules\n");
    if read_only.is_enforced() {
        prompt.push_str(
            "- Read only. INSERT, UPDATE, DELETE and schema changes are refused.\n",
        );
    } else {
        prompt.push_str("- Never modify data or schema unless the user explicitly asks.\n");
    }
    prompt.push_str(&format!(
        "- Look at the schema before writing SQL.\n\
         - Use {dialect} syntax only.\n\
         - If the question cannot be answered from this database, say so and suggest what could be asked instead.\n"
    ));

    prompt
}
