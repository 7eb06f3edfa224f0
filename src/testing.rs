//! Record types shared by the unit tests
//!
//! A small SQL Server flavored model: schemas, `(newid())` and `(getdate())`
//! defaults, a computed column, an owned value that refers to itself, and an
//! explicit join entity.

use crate::error::SeedError;
use crate::model::{Entity, EntityDescriptor, FieldDescriptor, Row, ValueType};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct Address {
    pub street: String,
    pub city: Option<String>,
    pub parent: Option<Box<Address>>,
}

impl Entity for Address {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Address")
            .field(FieldDescriptor::scalar("Street", ValueType::Text))
            .field(FieldDescriptor::scalar("City", ValueType::Text).nullable())
            .field(FieldDescriptor::owned("Parent", Address::descriptor).nullable())
    }

    fn to_row(&self) -> Row {
        let mut row = Row::new()
            .with("Street", self.street.as_str())
            .with("City", self.city.clone());
        row.set("Parent", self.parent.as_ref().map(|p| p.to_row()));
        row
    }

    fn from_row(row: &Row) -> Result<Self, SeedError> {
        Ok(Self {
            street: row.get_as("Street")?,
            city: row.get_as("City")?,
            parent: row.owned::<Address>("Parent")?.map(Box::new),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: i64,
    pub first_name: String,
    pub last_name: Option<String>,
    pub full_name: Option<String>,
    pub rowguid: Option<Uuid>,
    pub modified_date: Option<DateTime<Utc>>,
    pub home_address: Option<Address>,
    pub orders: Vec<Order>,
}

impl Person {
    pub fn new(id: i64, first_name: &str, last_name: &str) -> Self {
        Self {
            id,
            first_name: first_name.to_string(),
            last_name: Some(last_name.to_string()),
            full_name: None,
            rowguid: None,
            modified_date: None,
            home_address: None,
            orders: Vec::new(),
        }
    }
}

impl Entity for Person {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Person")
            .in_schema("Person")
            .field(FieldDescriptor::scalar("Id", ValueType::Integer).key())
            .field(FieldDescriptor::scalar("FirstName", ValueType::Text))
            .field(FieldDescriptor::scalar("LastName", ValueType::Text).nullable())
            .field(
                FieldDescriptor::scalar("FullName", ValueType::Text)
                    .nullable()
                    .computed("([FirstName]+' '+[LastName])"),
            )
            .field(FieldDescriptor::scalar("Rowguid", ValueType::Uuid).default_sql("(newid())"))
            .field(
                FieldDescriptor::scalar("ModifiedDate", ValueType::Timestamp)
                    .nullable()
                    .default_sql("(getdate())"),
            )
            .field(FieldDescriptor::owned("HomeAddress", Address::descriptor).nullable())
            .field(FieldDescriptor::collection("Orders", Order::descriptor))
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("Id", self.id)
            .with("FirstName", self.first_name.as_str())
            .with("LastName", self.last_name.clone())
            .with("FullName", self.full_name.clone())
            .with("Rowguid", self.rowguid)
            .with("ModifiedDate", self.modified_date)
            .with("HomeAddress", self.home_address.as_ref().map(|a| a.to_row()))
    }

    fn from_row(row: &Row) -> Result<Self, SeedError> {
        Ok(Self {
            id: row.get_as("Id")?,
            first_name: row.get_as("FirstName")?,
            last_name: row.get_as("LastName")?,
            full_name: row.get_as("FullName")?,
            rowguid: row.get_as("Rowguid")?,
            modified_date: row.get_as("ModifiedDate")?,
            home_address: row.owned("HomeAddress")?,
            orders: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub person_id: i64,
    pub total: f64,
    pub placed_on: NaiveDate,
    pub person: Option<Box<Person>>,
}

impl Entity for Order {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Order")
            .in_schema("Sales")
            .table("SalesOrder")
            .field(FieldDescriptor::scalar("Id", ValueType::Integer).key())
            .field(FieldDescriptor::scalar("PersonId", ValueType::Integer).foreign_key(Person::descriptor))
            .field(FieldDescriptor::scalar("Total", ValueType::Real))
            .field(FieldDescriptor::scalar("PlacedOn", ValueType::Date))
            .field(FieldDescriptor::reference("Person", Person::descriptor))
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("Id", self.id)
            .with("PersonId", self.person_id)
            .with("Total", self.total)
            .with("PlacedOn", self.placed_on)
    }

    fn from_row(row: &Row) -> Result<Self, SeedError> {
        Ok(Self {
            id: row.get_as("Id")?,
            person_id: row.get_as("PersonId")?,
            total: row.get_as("Total")?,
            placed_on: row.get_as("PlacedOn")?,
            person: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub label: String,
}

impl Entity for Tag {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Tag")
            .field(FieldDescriptor::scalar("Id", ValueType::Integer).key())
            .field(FieldDescriptor::scalar("Label", ValueType::Text))
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("Id", self.id)
            .with("Label", self.label.as_str())
    }

    fn from_row(row: &Row) -> Result<Self, SeedError> {
        Ok(Self {
            id: row.get_as("Id")?,
            label: row.get_as("Label")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderTag {
    pub order_id: i64,
    pub tag_id: i64,
    pub order: Option<Box<Order>>,
    pub tag: Option<Box<Tag>>,
}

impl Entity for OrderTag {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("OrderTag")
            .in_schema("Sales")
            .field(
                FieldDescriptor::scalar("OrderId", ValueType::Integer)
                    .key()
                    .foreign_key(Order::descriptor),
            )
            .field(
                FieldDescriptor::scalar("TagId", ValueType::Integer)
                    .key()
                    .foreign_key(Tag::descriptor),
            )
            .field(FieldDescriptor::reference("Order", Order::descriptor))
            .field(FieldDescriptor::reference("Tag", Tag::descriptor))
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("OrderId", self.order_id)
            .with("TagId", self.tag_id)
    }

    fn from_row(row: &Row) -> Result<Self, SeedError> {
        Ok(Self {
            order_id: row.get_as("OrderId")?,
            tag_id: row.get_as("TagId")?,
            order: None,
            tag: None,
        })
    }
}

/// Date column filled by `(getdate())`
#[derive(Debug, Clone, PartialEq)]
pub struct Visit {
    pub id: i64,
    pub day: Option<NaiveDate>,
}

impl Entity for Visit {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Visit")
            .in_schema("Sales")
            .field(FieldDescriptor::scalar("Id", ValueType::Integer).key())
            .field(
                FieldDescriptor::scalar("Day", ValueType::Date)
                    .nullable()
                    .default_sql("(getdate())"),
            )
    }

    fn to_row(&self) -> Row {
        Row::new().with("Id", self.id).with("Day", self.day)
    }

    fn from_row(row: &Row) -> Result<Self, SeedError> {
        Ok(Self {
            id: row.get_as("Id")?,
            day: row.get_as("Day")?,
        })
    }
}
