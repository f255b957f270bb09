use std::str::FromStr;

use diesel::{
    backend::Backend,
    deserialize::{FromSql, FromSqlRow},
    expression::AsExpression,
    pg::Pg,
    prelude::*,
    serialize::ToSql,
    sql_types,
};

pub(super) type BoxedDieselExpression<'a, QuerySource> =
    Box<dyn BoxableExpression<QuerySource, Pg, SqlType = sql_types::Bool> + 'a>;

pub(super) trait AsDieselExpression<QuerySource = ()> {
    fn as_diesel_expression<'a>(&'a self) -> Option<BoxedDieselExpression<'a, QuerySource>>
    where
        QuerySource: 'a,
    {
        None
    }
}

// Text-mapped enums fall back to their default variant rather than erroring on
// an unknown database value
pub(super) trait DbEnum:
    FromStr
    + Into<&'static str>
    + FromSqlRow<sql_types::Text, Pg>
    + AsExpression<sql_types::Text>
    + Copy
    + Default
{
    fn from_sql_inner(bytes: <Pg as Backend>::RawValue<'_>) -> diesel::deserialize::Result<Self> {
        let raw: String = FromSql::<sql_types::Text, Pg>::from_sql(bytes)?;

        Ok(Self::from_str(&raw).unwrap_or_default())
    }

    fn to_sql_inner<'b>(
        self,
        out: &mut diesel::serialize::Output<'b, '_, Pg>,
    ) -> diesel::serialize::Result {
        let as_str = self.into();

        ToSql::<sql_types::Text, Pg>::to_sql(as_str, out)
    }
}

pub(super) trait AsIlike {
    fn as_ilike(&self) -> String;
}

impl AsIlike for &str {
    fn as_ilike(&self) -> String {
        format!("%{self}%")
    }
}

impl AsIlike for String {
    fn as_ilike(&self) -> String {
        self.as_str().as_ilike()
    }
}
