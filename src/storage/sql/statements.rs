//! Dialect-neutral statement builders for shard tables.

use chrono::{DateTime, Utc};
use sea_query::{
    Alias, Asterisk, Expr, InsertStatement, LockType, Order, Query, SelectStatement, UnionType,
    UpdateStatement,
};

use crate::model::{ListFilter, MessageLog, MessageStatus};
use crate::storage::helpers::to_millis;
use crate::storage::schema::{MessageLogs, UNION_ALIAS};
use crate::uid::Uid;

/// `SELECT * FROM {shard} WHERE uid = ? AND namespace = ?`, optionally
/// `FOR UPDATE`.
pub(super) fn select_by_uid(shard: &str, namespace: &str, uid: Uid, lock: bool) -> SelectStatement {
    let mut stmt = Query::select()
        .columns(MessageLogs::ALL)
        .from(Alias::new(shard))
        .and_where(Expr::col(MessageLogs::Uid).eq(uid.as_i64()))
        .and_where(Expr::col(MessageLogs::Namespace).eq(namespace))
        .to_owned();
    if lock {
        stmt.lock(LockType::Update);
    }
    stmt
}

/// Insert every column except `id`, returning the assigned `id`.
pub(super) fn insert_log(shard: &str, log: &MessageLog) -> InsertStatement {
    Query::insert()
        .into_table(Alias::new(shard))
        .columns([
            MessageLogs::Uid,
            MessageLogs::Namespace,
            MessageLogs::SendAt,
            MessageLogs::Message,
            MessageLogs::Config,
            MessageLogs::Type,
            MessageLogs::Status,
            MessageLogs::RetryTotal,
            MessageLogs::LastError,
            MessageLogs::CreatedAt,
            MessageLogs::UpdatedAt,
        ])
        .values_panic([
            log.uid.as_i64().into(),
            log.namespace.as_str().into(),
            to_millis(log.send_at).into(),
            log.message.clone().into(),
            log.config.clone().into(),
            log.message_type.as_str().into(),
            log.status.as_str().into(),
            log.retry_total.into(),
            log.last_error.clone().into(),
            to_millis(log.created_at).into(),
            to_millis(log.updated_at).into(),
        ])
        .returning_col(MessageLogs::Id)
        .to_owned()
}

/// Compare-and-set on `status`; affects one row only when it is still `old`.
pub(super) fn update_status_if(
    shard: &str,
    namespace: &str,
    uid: Uid,
    old: MessageStatus,
    new: MessageStatus,
    now: DateTime<Utc>,
) -> UpdateStatement {
    Query::update()
        .table(Alias::new(shard))
        .values([
            (MessageLogs::Status, new.as_str().into()),
            (MessageLogs::UpdatedAt, to_millis(now).into()),
        ])
        .and_where(Expr::col(MessageLogs::Uid).eq(uid.as_i64()))
        .and_where(Expr::col(MessageLogs::Namespace).eq(namespace))
        .and_where(Expr::col(MessageLogs::Status).eq(old.as_str()))
        .to_owned()
}

/// `retry_total = retry_total + 1` and overwrite `last_error`.
pub(super) fn record_attempt(
    shard: &str,
    namespace: &str,
    uid: Uid,
    last_error: Option<&str>,
    now: DateTime<Utc>,
) -> UpdateStatement {
    Query::update()
        .table(Alias::new(shard))
        .value(
            MessageLogs::RetryTotal,
            Expr::col(MessageLogs::RetryTotal).add(1),
        )
        .value(MessageLogs::LastError, last_error.map(str::to_string))
        .value(MessageLogs::UpdatedAt, to_millis(now))
        .and_where(Expr::col(MessageLogs::Uid).eq(uid.as_i64()))
        .and_where(Expr::col(MessageLogs::Namespace).eq(namespace))
        .to_owned()
}

/// Page query and, when paginating, the matching count query over the
/// `UNION ALL` of `shards`. `None` when there is no shard to read.
///
/// Filters are applied inside every member so each shard can use its own
/// indexes; ordering and pagination apply to the union.
pub(super) fn list(
    shards: &[String],
    namespace: &str,
    filter: &ListFilter,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Option<(SelectStatement, Option<SelectStatement>)> {
    let (first, rest) = shards.split_first()?;
    let mut union = list_member(first, namespace, filter, start, end);
    for shard in rest {
        union.union(UnionType::All, list_member(shard, namespace, filter, start, end));
    }

    let mut page = Query::select()
        .columns(MessageLogs::ALL)
        .from_subquery(union.clone(), Alias::new(UNION_ALIAS))
        .order_by(MessageLogs::CreatedAt, Order::Desc)
        .order_by(MessageLogs::Uid, Order::Desc)
        .to_owned();

    let count = filter.limit_offset().map(|(limit, offset)| {
        page.limit(limit).offset(offset);
        Query::select()
            .expr(Expr::col(Asterisk).count())
            .from_subquery(union, Alias::new(UNION_ALIAS))
            .to_owned()
    });

    Some((page, count))
}

fn list_member(
    shard: &str,
    namespace: &str,
    filter: &ListFilter,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> SelectStatement {
    let mut stmt = Query::select()
        .columns(MessageLogs::ALL)
        .from(Alias::new(shard))
        .and_where(Expr::col(MessageLogs::Namespace).eq(namespace))
        .and_where(Expr::col(MessageLogs::SendAt).gte(to_millis(start)))
        .and_where(Expr::col(MessageLogs::SendAt).lt(to_millis(end)))
        .to_owned();
    if let Some(status) = filter.status {
        stmt.and_where(Expr::col(MessageLogs::Status).eq(status.as_str()));
    }
    if let Some(message_type) = filter.message_type {
        stmt.and_where(Expr::col(MessageLogs::Type).eq(message_type.as_str()));
    }
    stmt
}
