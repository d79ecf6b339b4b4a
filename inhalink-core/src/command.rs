//! Record Access Control Point (RACP) codes

use std::fmt;

use crate::error::{Error, Result};

/// RACP op codes
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    ReportStoredRecords = 1,
    DeleteStoredRecords = 2,
    AbortOperation = 3,
    ReportNumberOfStoredRecords = 4,
    NumberOfStoredRecordsResponse = 5,
    ResponseCode = 6,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Self::ReportStoredRecords => "REPORT_STORED_RECORDS",
            Self::DeleteStoredRecords => "DELETE_STORED_RECORDS",
            Self::AbortOperation => "ABORT_OPERATION",
            Self::ReportNumberOfStoredRecords => "REPORT_NUMBER_OF_STORED_RECORDS",
            Self::NumberOfStoredRecordsResponse => "NUMBER_OF_STORED_RECORDS_RESPONSE",
            Self::ResponseCode => "RESPONSE_CODE",
        }
    }
}

impl From<Opcode> for u8 {
    fn from(opcode: Opcode) -> u8 {
        opcode as u8
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::ReportStoredRecords),
            2 => Ok(Self::DeleteStoredRecords),
            3 => Ok(Self::AbortOperation),
            4 => Ok(Self::ReportNumberOfStoredRecords),
            5 => Ok(Self::NumberOfStoredRecordsResponse),
            6 => Ok(Self::ResponseCode),
            _ => Err(Error::UnknownOpcode(value)),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}

/// RACP filter operators
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Operator {
    Null = 0,
    AllRecords = 1,
    LessThanOrEqual = 2,
    GreaterThanOrEqual = 3,
    WithinRange = 4,
    FirstRecord = 5,
    LastRecord = 6,
}

/// What the operand of a filtered request refers to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FilterType {
    RecordId = 1,
}

/// Status carried in a RACP response
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseCode {
    Success = 1,
    OpcodeNotSupported = 2,
    InvalidOperator = 3,
    OperatorNotSupported = 4,
    InvalidOperand = 5,
    NoRecordsFound = 6,
    AbortUnsuccessful = 7,
    ProcedureNotCompleted = 8,
    OperandNotSupported = 9,
}

impl ResponseCode {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::OpcodeNotSupported => "OPCODE_NOT_SUPPORTED",
            Self::InvalidOperator => "INVALID_OPERATOR",
            Self::OperatorNotSupported => "OPERATOR_NOT_SUPPORTED",
            Self::InvalidOperand => "INVALID_OPERAND",
            Self::NoRecordsFound => "NO_RECORDS_FOUND",
            Self::AbortUnsuccessful => "ABORT_UNSUCCESSFUL",
            Self::ProcedureNotCompleted => "PROCEDURE_NOT_COMPLETED",
            Self::OperandNotSupported => "OPERAND_NOT_SUPPORTED",
        }
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Success),
            2 => Ok(Self::OpcodeNotSupported),
            3 => Ok(Self::InvalidOperator),
            4 => Ok(Self::OperatorNotSupported),
            5 => Ok(Self::InvalidOperand),
            6 => Ok(Self::NoRecordsFound),
            7 => Ok(Self::AbortUnsuccessful),
            8 => Ok(Self::ProcedureNotCompleted),
            9 => Ok(Self::OperandNotSupported),
            _ => Err(Error::UnknownResponseCode(value)),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), *self as u8)
    }
}
