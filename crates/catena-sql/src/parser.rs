//! Recursive-descent parser. One statement in, one `Statement` out; nesting
//! depth is tracked explicitly rather than relying on the host stack so that
//! the limit from §4.1 is enforced deterministically regardless of platform
//! stack size.

use catena_types::{Hash, OrderedMap};

use crate::ast::*;
use crate::error::{SqlError, SqlResult};
use crate::lexer::{Lexer, Token};

const MAX_DEPTH: usize = 10;

pub fn parse_statement(input: &str) -> SqlResult<Statement> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let stmt = parser.statement()?;
    parser.expect_eof_or_semicolon()?;
    Ok(stmt)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn enter(&mut self) -> SqlResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(SqlError::NestingTooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.depth -= 1;
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn pos_here(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> SqlError {
        SqlError::Parse {
            message: message.into(),
            position: self.pos_here(),
        }
    }

    fn expect_eof_or_semicolon(&mut self) -> SqlResult<()> {
        if matches!(self.peek(), Token::Semicolon) {
            self.bump();
        }
        if !matches!(self.peek(), Token::Eof) {
            return Err(self.err("unexpected trailing input"));
        }
        Ok(())
    }

    fn keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Ident(s) if s == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.keyword(kw) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> SqlResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.err(format!("expected `{}`", kw.to_uppercase())))
        }
    }

    fn expect_ident(&mut self) -> SqlResult<String> {
        match self.bump() {
            Token::Ident(s) => Ok(s),
            _ => Err(self.err("expected identifier")),
        }
    }

    fn expect(&mut self, tok: Token) -> SqlResult<()> {
        if *self.peek() == tok {
            self.bump();
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}", tok)))
        }
    }

    // ---- statements ----

    fn statement(&mut self) -> SqlResult<Statement> {
        self.enter()?;
        let result = self.statement_inner();
        self.exit();
        result
    }

    fn statement_inner(&mut self) -> SqlResult<Statement> {
        if self.keyword("select") {
            return Ok(Statement::Select(self.select()?));
        }
        if self.eat_keyword("insert") {
            return Ok(Statement::Insert(self.insert()?));
        }
        if self.eat_keyword("update") {
            return Ok(Statement::Update(self.update()?));
        }
        if self.eat_keyword("delete") {
            return Ok(Statement::Delete(self.delete()?));
        }
        if self.eat_keyword("create") {
            if self.eat_keyword("table") {
                return Ok(Statement::CreateTable(self.create_table()?));
            }
            if self.eat_keyword("index") {
                return Ok(Statement::CreateIndex(self.create_index()?));
            }
            if self.eat_keyword("database") {
                let name = self.expect_ident()?;
                return Ok(Statement::CreateDatabase(CreateDatabase { name }));
            }
            return Err(self.err("expected TABLE, INDEX, or DATABASE after CREATE"));
        }
        if self.eat_keyword("drop") {
            if self.eat_keyword("table") {
                let name = self.expect_ident()?;
                return Ok(Statement::DropTable(DropTable { table: name }));
            }
            if self.eat_keyword("database") {
                let name = self.expect_ident()?;
                return Ok(Statement::DropDatabase(DropDatabase { name }));
            }
            return Err(self.err("expected TABLE or DATABASE after DROP"));
        }
        if self.eat_keyword("grant") {
            if self.eat_keyword("template") {
                return Ok(Statement::GrantTemplate(self.grant_template()?));
            }
            return Ok(Statement::Grant(self.grant()?));
        }
        if self.eat_keyword("revoke") {
            if self.eat_keyword("template") {
                return Ok(Statement::RevokeTemplate(self.revoke_template()?));
            }
            return Ok(Statement::Revoke(self.revoke()?));
        }
        if self.eat_keyword("show") {
            return Ok(Statement::Show(self.show()?));
        }
        if self.eat_keyword("describe") {
            let table = self.expect_ident()?;
            return Ok(Statement::Describe(Describe { table }));
        }
        if self.eat_keyword("if") {
            return Ok(Statement::If(self.if_statement()?));
        }
        if self.eat_keyword("do") {
            return Ok(Statement::Block(self.block()?));
        }
        if self.eat_keyword("fail") {
            return Ok(Statement::Fail);
        }
        Err(self.err("expected a statement"))
    }

    fn grant_privilege_kind(&mut self) -> SqlResult<GrantPrivilegeKind> {
        if self.eat_keyword("create") {
            Ok(GrantPrivilegeKind::Create)
        } else if self.eat_keyword("delete") {
            Ok(GrantPrivilegeKind::Delete)
        } else if self.eat_keyword("drop") {
            Ok(GrantPrivilegeKind::Drop)
        } else if self.eat_keyword("insert") {
            Ok(GrantPrivilegeKind::Insert)
        } else if self.eat_keyword("update") {
            Ok(GrantPrivilegeKind::Update)
        } else if self.eat_keyword("grant") {
            Ok(GrantPrivilegeKind::Grant)
        } else {
            Err(self.err("expected a privilege name"))
        }
    }

    /// `ON table` is omitted for database-scoped privileges (CREATE, DROP).
    fn optional_on_table(&mut self) -> SqlResult<Option<String>> {
        if self.eat_keyword("on") {
            Ok(Some(self.expect_ident()?))
        } else {
            Ok(None)
        }
    }

    /// `TO`/`FROM` introduces a grant/revoke target (§6 `GRANT/REVOKE … TO
    /// [X'hash'|NULL]`); `FOR` introduces `SHOW DATABASES FOR X'hash'`
    /// (§6). `NULL` and `PUBLIC` are synonyms for "any user."
    fn optional_to_or_from_user(&mut self) -> SqlResult<Option<Vec<u8>>> {
        if self.eat_keyword("to") || self.eat_keyword("from") || self.eat_keyword("for") {
            if self.eat_keyword("public") || self.eat_keyword("null") {
                return Ok(None);
            }
            match self.bump() {
                Token::Blob(b) => Ok(Some(b)),
                Token::Str(s) => Ok(Some(hex::decode(&s).map_err(|_| {
                    self.err("expected hex-encoded public key")
                })?)),
                _ => Err(self.err("expected a user (hex public key), NULL, or PUBLIC")),
            }
        } else {
            Ok(None)
        }
    }

    fn grant(&mut self) -> SqlResult<Grant> {
        let privilege = self.grant_privilege_kind()?;
        let table = self.optional_on_table()?;
        let user = self.optional_to_or_from_user()?;
        Ok(Grant {
            privilege,
            table,
            user,
        })
    }

    fn revoke(&mut self) -> SqlResult<Revoke> {
        let privilege = self.grant_privilege_kind()?;
        let table = self.optional_on_table()?;
        let user = self.optional_to_or_from_user()?;
        Ok(Revoke {
            privilege,
            table,
            user,
        })
    }

    fn expect_hash_literal(&mut self) -> SqlResult<Hash> {
        match self.bump() {
            Token::Blob(b) => {
                Hash::try_from(b.as_slice()).map_err(|_| self.err("expected a 32-byte hash literal"))
            }
            _ => Err(self.err("expected an X'...' hash literal")),
        }
    }

    fn grant_template(&mut self) -> SqlResult<GrantTemplate> {
        let hash = self.expect_hash_literal()?;
        let user = self.optional_to_or_from_user()?;
        Ok(GrantTemplate { hash, user })
    }

    fn revoke_template(&mut self) -> SqlResult<RevokeTemplate> {
        let hash = self.expect_hash_literal()?;
        let user = self.optional_to_or_from_user()?;
        Ok(RevokeTemplate { hash, user })
    }

    fn show(&mut self) -> SqlResult<Show> {
        if self.eat_keyword("tables") {
            Ok(Show::Tables)
        } else if self.eat_keyword("databases") {
            let for_user = self.optional_to_or_from_user()?;
            Ok(Show::Databases { for_user })
        } else if self.eat_keyword("grants") {
            Ok(Show::Grants)
        } else if self.eat_keyword("all") {
            Ok(Show::All)
        } else {
            Err(self.err("expected TABLES, DATABASES, GRANTS, or ALL after SHOW"))
        }
    }

    fn if_statement(&mut self) -> SqlResult<If> {
        let mut branches = Vec::new();
        let condition = self.expr()?;
        self.expect_keyword("then")?;
        let then_branch = Box::new(self.statement()?);
        branches.push(IfBranch {
            condition,
            then_branch,
        });
        while self.eat_keyword("elseif") {
            let condition = self.expr()?;
            self.expect_keyword("then")?;
            let then_branch = Box::new(self.statement()?);
            branches.push(IfBranch {
                condition,
                then_branch,
            });
        }
        let else_branch = if self.eat_keyword("else") {
            Some(Box::new(self.statement()?))
        } else {
            None
        };
        self.expect_keyword("end")?;
        Ok(If {
            branches,
            else_branch,
        })
    }

    fn block(&mut self) -> SqlResult<Vec<Statement>> {
        let mut stmts = Vec::new();
        loop {
            if self.eat_keyword("end") {
                break;
            }
            stmts.push(self.statement()?);
            if matches!(self.peek(), Token::Semicolon) {
                self.bump();
            }
        }
        Ok(stmts)
    }

    fn create_table(&mut self) -> SqlResult<CreateTable> {
        let table = self.expect_ident()?;
        self.expect(Token::LParen)?;
        let mut columns = OrderedMap::new();
        let mut names = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let ty = if self.eat_keyword("text") {
                ColumnType::Text
            } else if self.eat_keyword("int") {
                ColumnType::Int
            } else if self.eat_keyword("blob") {
                ColumnType::Blob
            } else {
                return Err(self.err("expected a column type (TEXT, INT, or BLOB)"));
            };
            let primary_key = self.eat_keyword("primary") && {
                self.expect_keyword("key")?;
                true
            };
            names.push(name.clone());
            columns.insert(name, ColumnDef { ty, primary_key });
            if matches!(self.peek(), Token::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        self.expect(Token::RParen)?;
        let mut seen = std::collections::HashSet::new();
        for name in &names {
            if !seen.insert(name) {
                return Err(SqlError::DuplicateColumn(name.clone()));
            }
        }
        Ok(CreateTable { table, columns })
    }

    fn create_index(&mut self) -> SqlResult<CreateIndex> {
        let name = self.expect_ident()?;
        self.expect_keyword("on")?;
        let table = self.expect_ident()?;
        self.expect(Token::LParen)?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.expect_ident()?);
            if matches!(self.peek(), Token::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        self.expect(Token::RParen)?;
        Ok(CreateIndex {
            name,
            table,
            columns,
        })
    }

    fn insert(&mut self) -> SqlResult<Insert> {
        let or_replace = self.eat_keyword("or") && {
            self.expect_keyword("replace")?;
            true
        };
        self.expect_keyword("into")?;
        let table = self.expect_ident()?;
        let mut columns = Vec::new();
        if matches!(self.peek(), Token::LParen) {
            self.bump();
            loop {
                columns.push(self.expect_ident()?);
                if matches!(self.peek(), Token::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
            self.expect(Token::RParen)?;
        }
        self.expect_keyword("values")?;
        let mut values = Vec::new();
        loop {
            self.expect(Token::LParen)?;
            let mut row = Vec::new();
            loop {
                row.push(self.expr()?);
                if matches!(self.peek(), Token::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
            self.expect(Token::RParen)?;
            values.push(row);
            if matches!(self.peek(), Token::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        Ok(Insert {
            or_replace,
            table,
            columns,
            values,
        })
    }

    fn update(&mut self) -> SqlResult<Update> {
        let table = self.expect_ident()?;
        self.expect_keyword("set")?;
        let mut assignments = OrderedMap::new();
        loop {
            let name = self.expect_ident()?;
            self.expect(Token::Eq)?;
            let value = self.expr()?;
            assignments.insert(name, value);
            if matches!(self.peek(), Token::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        let where_clause = if self.eat_keyword("where") {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(Update {
            table,
            assignments,
            where_clause,
        })
    }

    fn delete(&mut self) -> SqlResult<Delete> {
        self.expect_keyword("from")?;
        let table = self.expect_ident()?;
        let where_clause = if self.eat_keyword("where") {
            Some(self.expr()?)
        } else {
            None
        };
        Ok(Delete { table, where_clause })
    }

    fn table_ref(&mut self) -> SqlResult<TableRef> {
        let name = self.expect_ident()?;
        let alias = if self.eat_keyword("as") {
            Some(self.expect_ident()?)
        } else if let Token::Ident(s) = self.peek().clone() {
            if !is_reserved_after_table(&s) {
                self.bump();
                Some(s)
            } else {
                None
            }
        } else {
            None
        };
        Ok(TableRef { name, alias })
    }

    fn select(&mut self) -> SqlResult<Select> {
        self.expect_keyword("select")?;
        let distinct = self.eat_keyword("distinct");
        let mut columns = Vec::new();
        loop {
            columns.push(self.select_item()?);
            if matches!(self.peek(), Token::Comma) {
                self.bump();
                continue;
            }
            break;
        }
        let from = if self.eat_keyword("from") {
            Some(self.table_ref()?)
        } else {
            None
        };
        let mut joins = Vec::new();
        while self.eat_keyword("left") {
            self.expect_keyword("join")?;
            let table = self.table_ref()?;
            self.expect_keyword("on")?;
            let on = self.expr()?;
            joins.push(JoinClause { table, on });
        }
        let where_clause = if self.eat_keyword("where") {
            Some(self.expr()?)
        } else {
            None
        };
        let mut order_by = Vec::new();
        if self.eat_keyword("order") {
            self.expect_keyword("by")?;
            loop {
                let expr = self.expr()?;
                let desc = if self.eat_keyword("desc") {
                    true
                } else {
                    self.eat_keyword("asc");
                    false
                };
                order_by.push(OrderByItem { expr, desc });
                if matches!(self.peek(), Token::Comma) {
                    self.bump();
                    continue;
                }
                break;
            }
        }
        let limit = if self.eat_keyword("limit") {
            match self.bump() {
                Token::Int(n) => Some(n),
                _ => return Err(self.err("expected an integer after LIMIT")),
            }
        } else {
            None
        };
        Ok(Select {
            distinct,
            columns,
            from,
            joins,
            where_clause,
            order_by,
            limit,
        })
    }

    fn select_item(&mut self) -> SqlResult<SelectItem> {
        if matches!(self.peek(), Token::Star) {
            self.bump();
            return Ok(SelectItem::All);
        }
        if let Token::Ident(name) = self.peek().clone() {
            if self.tokens.get(self.pos + 1).map(|(t, _)| t) == Some(&Token::Dot)
                && self.tokens.get(self.pos + 2).map(|(t, _)| t) == Some(&Token::Star)
            {
                self.bump();
                self.bump();
                self.bump();
                return Ok(SelectItem::AllOf(name));
            }
        }
        let expr = self.expr()?;
        let alias = if self.eat_keyword("as") {
            Some(self.expect_ident()?)
        } else {
            None
        };
        Ok(SelectItem::Expr { expr, alias })
    }

    // ---- expressions (precedence climbing) ----

    fn expr(&mut self) -> SqlResult<Expr> {
        self.enter()?;
        let result = self.expr_or();
        self.exit();
        result
    }

    fn expr_or(&mut self) -> SqlResult<Expr> {
        let mut left = self.expr_and()?;
        while self.eat_keyword("or") {
            let right = self.expr_and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn expr_and(&mut self) -> SqlResult<Expr> {
        let mut left = self.expr_not()?;
        while self.eat_keyword("and") {
            let right = self.expr_not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn expr_not(&mut self) -> SqlResult<Expr> {
        if self.eat_keyword("not") {
            let inner = self.expr_not()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(inner)));
        }
        self.expr_comparison()
    }

    fn expr_comparison(&mut self) -> SqlResult<Expr> {
        let left = self.expr_additive()?;
        let op = match self.peek() {
            Token::Eq => Some(BinaryOp::Eq),
            Token::Ne => Some(BinaryOp::Ne),
            Token::Lt => Some(BinaryOp::Lt),
            Token::Le => Some(BinaryOp::Le),
            Token::Gt => Some(BinaryOp::Gt),
            Token::Ge => Some(BinaryOp::Ge),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let right = self.expr_additive()?;
            return Ok(Expr::Binary(op, Box::new(left), Box::new(right)));
        }
        if self.keyword("is") {
            self.bump();
            self.expect_keyword("null")?;
            return Ok(Expr::IsNull(Box::new(left)));
        }
        Ok(left)
    }

    fn expr_additive(&mut self) -> SqlResult<Expr> {
        let mut left = self.expr_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                Token::Concat => BinaryOp::Concat,
                _ => break,
            };
            self.bump();
            let right = self.expr_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn expr_multiplicative(&mut self) -> SqlResult<Expr> {
        let mut left = self.expr_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.bump();
            let right = self.expr_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn expr_unary(&mut self) -> SqlResult<Expr> {
        if matches!(self.peek(), Token::Minus) {
            self.bump();
            let inner = self.expr_unary()?;
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(inner)));
        }
        self.expr_primary()
    }

    fn expr_primary(&mut self) -> SqlResult<Expr> {
        match self.peek().clone() {
            Token::Int(n) => {
                self.bump();
                Ok(Expr::LiteralInt(n))
            }
            Token::Str(s) => {
                self.bump();
                Ok(Expr::LiteralString(s))
            }
            Token::Blob(b) => {
                self.bump();
                Ok(Expr::LiteralBlob(b))
            }
            Token::Variable(name) => {
                self.bump();
                Ok(Expr::Variable(name))
            }
            Token::Param(name) => {
                self.bump();
                if matches!(self.peek(), Token::Colon) {
                    self.bump();
                    let value = self.param_literal()?;
                    return Ok(Expr::BoundParameter {
                        name,
                        value: Box::new(value),
                    });
                }
                Ok(Expr::UnboundParameter(name))
            }
            Token::LParen => {
                self.enter()?;
                self.bump();
                let inner = self.expr_or()?;
                self.expect(Token::RParen)?;
                self.exit();
                Ok(inner)
            }
            Token::Star => Err(self.err("`*` is only valid in a SELECT list")),
            Token::Ident(name) => {
                if name == "null" {
                    self.bump();
                    return Ok(Expr::Null);
                }
                if name == "case" {
                    return self.case_expr();
                }
                if name == "exists" {
                    self.bump();
                    self.enter()?;
                    self.expect(Token::LParen)?;
                    let select = self.select()?;
                    self.expect(Token::RParen)?;
                    self.exit();
                    return Ok(Expr::Exists(Box::new(select)));
                }
                self.bump();
                if matches!(self.peek(), Token::LParen) {
                    self.enter()?;
                    self.bump();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Token::RParen) {
                        loop {
                            args.push(self.expr_or()?);
                            if matches!(self.peek(), Token::Comma) {
                                self.bump();
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(Token::RParen)?;
                    self.exit();
                    return Ok(Expr::Call { name, args });
                }
                if matches!(self.peek(), Token::Dot) {
                    self.bump();
                    if matches!(self.peek(), Token::Star) {
                        self.bump();
                        return Ok(Expr::AllColumns { table: Some(name) });
                    }
                    let col = self.expect_ident()?;
                    return Ok(Expr::Column {
                        table: Some(name),
                        name: col,
                    });
                }
                Ok(Expr::Column { table: None, name })
            }
            _ => Err(self.err("expected an expression")),
        }
    }

    /// The literal bound to a `?name:value` parameter — deliberately a
    /// narrower grammar than a full expression (§6: "bound parameters" carry
    /// a value, not an arbitrary sub-expression).
    fn param_literal(&mut self) -> SqlResult<Expr> {
        match self.peek().clone() {
            Token::Minus => {
                self.bump();
                match self.peek().clone() {
                    Token::Int(n) => {
                        self.bump();
                        Ok(Expr::LiteralInt(-n))
                    }
                    _ => Err(self.err("expected an integer literal after `-`")),
                }
            }
            Token::Int(n) => {
                self.bump();
                Ok(Expr::LiteralInt(n))
            }
            Token::Str(s) => {
                self.bump();
                Ok(Expr::LiteralString(s))
            }
            Token::Blob(b) => {
                self.bump();
                Ok(Expr::LiteralBlob(b))
            }
            Token::Ident(name) if name == "null" => {
                self.bump();
                Ok(Expr::Null)
            }
            _ => Err(self.err("expected a literal value bound to a parameter")),
        }
    }

    fn case_expr(&mut self) -> SqlResult<Expr> {
        self.enter()?;
        self.expect_keyword("case")?;
        let mut branches = Vec::new();
        while self.eat_keyword("when") {
            let cond = self.expr_or()?;
            self.expect_keyword("then")?;
            let value = self.expr_or()?;
            branches.push((cond, value));
        }
        if branches.is_empty() {
            return Err(self.err("expected at least one WHEN branch in CASE"));
        }
        let else_branch = if self.eat_keyword("else") {
            Some(Box::new(self.expr_or()?))
        } else {
            None
        };
        self.expect_keyword("end")?;
        self.exit();
        Ok(Expr::Case {
            branches,
            else_branch,
        })
    }
}

fn is_reserved_after_table(ident: &str) -> bool {
    matches!(
        ident,
        "where" | "left" | "order" | "limit" | "set" | "values" | "on" | "group" | "end"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_select() {
        let stmt = parse_statement("SELECT * FROM accounts WHERE balance > 0").unwrap();
        match stmt {
            Statement::Select(s) => {
                assert!(matches!(s.columns[0], SelectItem::All));
                assert_eq!(s.from.unwrap().name, "accounts");
                assert!(s.where_clause.is_some());
            }
            _ => panic!("expected select"),
        }
    }

    #[test]
    fn parses_insert_with_columns() {
        let stmt = parse_statement("INSERT INTO t (a, b) VALUES (1, 'x')").unwrap();
        match stmt {
            Statement::Insert(i) => {
                assert_eq!(i.columns, vec!["a", "b"]);
                assert_eq!(i.values.len(), 1);
            }
            _ => panic!("expected insert"),
        }
    }

    #[test]
    fn parses_create_table_with_primary_key() {
        let stmt = parse_statement("CREATE TABLE t (id INT PRIMARY KEY, name TEXT)").unwrap();
        match stmt {
            Statement::CreateTable(c) => {
                assert!(c.columns.get(&"id".to_string()).unwrap().primary_key);
                assert!(!c.columns.get(&"name".to_string()).unwrap().primary_key);
            }
            _ => panic!("expected create table"),
        }
    }

    #[test]
    fn rejects_duplicate_columns() {
        let err = parse_statement("CREATE TABLE t (a INT, a TEXT)").unwrap_err();
        assert!(matches!(err, SqlError::DuplicateColumn(_)));
    }

    #[test]
    fn parses_nested_if() {
        let stmt = parse_statement(
            "IF $balance > 0 THEN IF $balance > 100 THEN FAIL END ELSE FAIL END",
        )
        .unwrap();
        assert!(matches!(stmt, Statement::If(_)));
    }

    #[test]
    fn parses_grant_to_public() {
        let stmt = parse_statement("GRANT INSERT ON accounts TO PUBLIC").unwrap();
        match stmt {
            Statement::Grant(g) => {
                assert_eq!(g.privilege, GrantPrivilegeKind::Insert);
                assert_eq!(g.table.as_deref(), Some("accounts"));
                assert!(g.user.is_none());
            }
            _ => panic!("expected grant"),
        }
    }

    #[test]
    fn parses_grant_to_null_as_public() {
        let stmt = parse_statement("GRANT INSERT ON accounts TO NULL").unwrap();
        match stmt {
            Statement::Grant(g) => {
                assert_eq!(g.table.as_deref(), Some("accounts"));
                assert!(g.user.is_none());
            }
            _ => panic!("expected grant"),
        }
    }

    #[test]
    fn parses_show_databases_for_user() {
        let user = "77".repeat(32);
        let stmt = parse_statement(&format!("SHOW DATABASES FOR X'{}'", user)).unwrap();
        match stmt {
            Statement::Show(Show::Databases { for_user }) => {
                assert_eq!(for_user, Some(vec![0x77u8; 32]));
            }
            _ => panic!("expected show databases"),
        }
    }

    #[test]
    fn parses_show_databases_with_no_filter() {
        let stmt = parse_statement("SHOW DATABASES").unwrap();
        assert!(matches!(stmt, Statement::Show(Show::Databases { for_user: None })));
    }

    #[test]
    fn parses_grant_template_to_public() {
        let hash = "11".repeat(32);
        let stmt =
            parse_statement(&format!("GRANT TEMPLATE X'{}' TO PUBLIC", hash)).unwrap();
        match stmt {
            Statement::GrantTemplate(g) => {
                assert_eq!(g.hash.as_bytes(), [0x11u8; 32]);
                assert!(g.user.is_none());
            }
            _ => panic!("expected grant template"),
        }
    }

    #[test]
    fn parses_revoke_template_from_user() {
        let hash = "22".repeat(32);
        let user = "33".repeat(32);
        let stmt = parse_statement(&format!(
            "REVOKE TEMPLATE X'{}' FROM X'{}'",
            hash, user
        ))
        .unwrap();
        match stmt {
            Statement::RevokeTemplate(r) => {
                assert_eq!(r.hash.as_bytes(), [0x22u8; 32]);
                assert_eq!(r.user, Some(vec![0x33u8; 32]));
            }
            _ => panic!("expected revoke template"),
        }
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut expr = String::from("1");
        for _ in 0..15 {
            expr = format!("({})", expr);
        }
        let source = format!("SELECT {}", expr);
        let err = parse_statement(&source).unwrap_err();
        assert!(matches!(err, SqlError::NestingTooDeep { .. }));
    }

    #[test]
    fn parses_case_expression() {
        let stmt = parse_statement("SELECT CASE WHEN a = 1 THEN 'x' ELSE 'y' END").unwrap();
        assert!(matches!(stmt, Statement::Select(_)));
    }
}
