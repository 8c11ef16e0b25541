use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::Instrument;

use crate::client::RequestParam;
use crate::common::function::FunctionCode;
use crate::connection::Connection;
use crate::decode::AppDecodeLevel;
use crate::device::{DeviceIdCategory, DeviceIdentification};
use crate::error::{AduParseError, InternalError, RequestError};
use crate::protocol::Protocol;
use crate::types::{AddressRange, ModbusObject, ObjectKind};

/// Typed Modbus operations on top of a [`Connection`] and a [`Protocol`]
///
/// Values returned by reads carry absolute addresses. Writes succeed only if the device echoes
/// exactly what was written.
pub struct Client {
    connection: Arc<Connection>,
    protocol: Option<Arc<dyn Protocol>>,
    dispose_connection: bool,
    disposed: AtomicBool,
    decode: AppDecodeLevel,
}

impl Client {
    /// Create a client
    ///
    /// A client without a protocol fails every operation with [`InternalError::NoProtocol`].
    /// If `dispose_connection` is set, disposing the client also disposes the connection.
    pub fn new(
        connection: Arc<Connection>,
        protocol: Option<Arc<dyn Protocol>>,
        dispose_connection: bool,
        decode: AppDecodeLevel,
    ) -> Self {
        Self {
            connection,
            protocol,
            dispose_connection,
            disposed: AtomicBool::new(false),
            decode,
        }
    }

    /// The connection requests are sent over
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Read coils. The returned values are addressed `start..start + count`.
    pub async fn read_coils(
        &self,
        param: RequestParam,
        start: u16,
        count: u16,
    ) -> Result<Vec<ModbusObject>, RequestError> {
        self.read(param, ObjectKind::Coil, start, count).await
    }

    /// Read discrete inputs. The returned values are addressed `start..start + count`.
    pub async fn read_discrete_inputs(
        &self,
        param: RequestParam,
        start: u16,
        count: u16,
    ) -> Result<Vec<ModbusObject>, RequestError> {
        self.read(param, ObjectKind::DiscreteInput, start, count)
            .await
    }

    /// Read holding registers. The returned values are addressed `start..start + count`.
    pub async fn read_holding_registers(
        &self,
        param: RequestParam,
        start: u16,
        count: u16,
    ) -> Result<Vec<ModbusObject>, RequestError> {
        self.read(param, ObjectKind::HoldingRegister, start, count)
            .await
    }

    /// Read input registers. The returned values are addressed `start..start + count`.
    pub async fn read_input_registers(
        &self,
        param: RequestParam,
        start: u16,
        count: u16,
    ) -> Result<Vec<ModbusObject>, RequestError> {
        self.read(param, ObjectKind::InputRegister, start, count)
            .await
    }

    /// Write a single coil
    pub async fn write_single_coil(
        &self,
        param: RequestParam,
        address: u16,
        value: bool,
    ) -> Result<(), RequestError> {
        let protocol = self.protocol()?;
        let function = FunctionCode::WriteSingleCoil;
        let coil = ModbusObject::coil(address, value);

        let request = protocol.serialize_write_single_coil(param.id, &coil)?;
        self.log_request(function, &coil);
        let response = self.execute(&protocol, &param, function, request).await?;
        let echo = self.logged(function, protocol.deserialize_write_single_coil(&response))?;

        expect_echo(echo == coil)
    }

    /// Write a single holding register
    pub async fn write_single_register(
        &self,
        param: RequestParam,
        address: u16,
        value: u16,
    ) -> Result<(), RequestError> {
        let protocol = self.protocol()?;
        let function = FunctionCode::WriteSingleRegister;
        let register = ModbusObject::holding_register(address, value);

        let request = protocol.serialize_write_single_register(param.id, &register)?;
        self.log_request(function, &register);
        let response = self.execute(&protocol, &param, function, request).await?;
        let echo = self.logged(function, protocol.deserialize_write_single_register(&response))?;

        expect_echo(echo == register)
    }

    /// Write a contiguous block of coils, given in any order
    pub async fn write_multiple_coils(
        &self,
        param: RequestParam,
        coils: &[ModbusObject],
    ) -> Result<(), RequestError> {
        let protocol = self.protocol()?;
        let function = FunctionCode::WriteMultipleCoils;

        let request = protocol.serialize_write_multiple_coils(param.id, coils)?;
        let expected = written_range(coils)?;
        self.log_request(function, &expected);
        let response = self.execute(&protocol, &param, function, request).await?;
        let echo = self.logged(function, protocol.deserialize_write_multiple_coils(&response))?;

        expect_echo(echo == expected)
    }

    /// Write a contiguous block of holding registers, given in any order
    pub async fn write_multiple_registers(
        &self,
        param: RequestParam,
        registers: &[ModbusObject],
    ) -> Result<(), RequestError> {
        let protocol = self.protocol()?;
        let function = FunctionCode::WriteMultipleRegisters;

        let request = protocol.serialize_write_multiple_registers(param.id, registers)?;
        let expected = written_range(registers)?;
        self.log_request(function, &expected);
        let response = self.execute(&protocol, &param, function, request).await?;
        let echo = self.logged(
            function,
            protocol.deserialize_write_multiple_registers(&response),
        )?;

        expect_echo(echo == expected)
    }

    /// Read the identification objects of a device, starting at `object_id`
    ///
    /// Stream categories are read page by page until the device reports that no more objects
    /// follow. The individual category reads exactly one object.
    pub async fn read_device_identification(
        &self,
        param: RequestParam,
        category: DeviceIdCategory,
        object_id: u8,
    ) -> Result<DeviceIdentification, RequestError> {
        let protocol = self.protocol()?;
        let function = FunctionCode::EncapsulatedInterface;

        let mut result = DeviceIdentification::default();
        let mut current = object_id;

        loop {
            let request =
                protocol.serialize_read_device_identification(param.id, category, current)?;
            self.log_request(function, &format_args!("{category} object: {current:#04X}"));
            let response = self.execute(&protocol, &param, function, request).await?;
            let page = self.logged(
                function,
                protocol.deserialize_read_device_identification(&response),
            )?;

            let more = page.more_requests_needed && category != DeviceIdCategory::Individual;
            let next = page.next_object_id;
            result.merge(page);

            if !more {
                break;
            }

            if next <= current {
                return Err(AduParseError::DeviceIdNotAdvancing(next).into());
            }
            current = next;
        }

        if self.decode.data_values() {
            tracing::info!("PDU RX - {} {}", function, result);
        }

        Ok(result)
    }

    /// Stop accepting requests. Disposes the connection too if the client was created to do so.
    /// Calling this more than once has no further effect.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        if self.dispose_connection {
            self.connection.dispose();
        }
    }

    /// true once [`Client::dispose`] was called
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn protocol(&self) -> Result<Arc<dyn Protocol>, RequestError> {
        if self.is_disposed() {
            return Err(RequestError::Shutdown);
        }

        self.protocol
            .clone()
            .ok_or(RequestError::Internal(InternalError::NoProtocol))
    }

    async fn read(
        &self,
        param: RequestParam,
        kind: ObjectKind,
        start: u16,
        count: u16,
    ) -> Result<Vec<ModbusObject>, RequestError> {
        let protocol = self.protocol()?;

        let (function, request) = match kind {
            ObjectKind::Coil => (
                FunctionCode::ReadCoils,
                protocol.serialize_read_coils(param.id, start, count)?,
            ),
            ObjectKind::DiscreteInput => (
                FunctionCode::ReadDiscreteInputs,
                protocol.serialize_read_discrete_inputs(param.id, start, count)?,
            ),
            ObjectKind::HoldingRegister => (
                FunctionCode::ReadHoldingRegisters,
                protocol.serialize_read_holding_registers(param.id, start, count)?,
            ),
            ObjectKind::InputRegister => (
                FunctionCode::ReadInputRegisters,
                protocol.serialize_read_input_registers(param.id, start, count)?,
            ),
        };

        self.log_request(function, &AddressRange { start, count });
        let response = self.execute(&protocol, &param, function, request).await?;

        let values = match kind {
            ObjectKind::Coil => protocol.deserialize_read_coils(&response),
            ObjectKind::DiscreteInput => protocol.deserialize_read_discrete_inputs(&response),
            ObjectKind::HoldingRegister => protocol.deserialize_read_holding_registers(&response),
            ObjectKind::InputRegister => protocol.deserialize_read_input_registers(&response),
        };

        let values = self.logged(function, values.and_then(|x| to_absolute(x, start, count)))?;

        if self.decode.data_values() {
            for value in &values {
                tracing::info!("{}", value);
            }
        }

        Ok(values)
    }

    /// Run one exchange and check that the response answers the request
    async fn execute(
        &self,
        protocol: &Arc<dyn Protocol>,
        param: &RequestParam,
        function: FunctionCode,
        request: Vec<u8>,
    ) -> Result<Vec<u8>, RequestError> {
        let is_complete = {
            let protocol = protocol.clone();
            move |response: &[u8]| protocol.check_response_complete(response)
        };

        let span = tracing::info_span!(
            "Transaction",
            unit_id = %param.id,
            protocol = protocol.name()
        );

        let response = self
            .connection
            .invoke(request.clone(), is_complete, &param.cancel)
            .instrument(span.clone())
            .await;

        let _guard = span.enter();
        let response = self.logged(function, response)?;
        self.logged(function, protocol.validate_response(&request, &response))?;
        Ok(response)
    }

    fn log_request(&self, function: FunctionCode, header: &dyn std::fmt::Display) {
        if self.decode.data_headers() {
            tracing::info!("PDU TX - {} {}", function, header);
        } else if self.decode.function_code() {
            tracing::info!("PDU TX - {}", function);
        }
    }

    /// Log the outcome of a response step, passing the result through
    fn logged<T>(
        &self,
        function: FunctionCode,
        result: Result<T, RequestError>,
    ) -> Result<T, RequestError> {
        match &result {
            Ok(_) => {
                if self.decode.function_code() {
                    tracing::debug!("PDU RX - {}", function);
                }
            }
            Err(RequestError::Exception(ex)) => {
                tracing::warn!("PDU RX - {} - Modbus exception: {}", function, ex);
            }
            Err(err) if err.is_cancellation() => {}
            Err(err) => tracing::warn!("PDU RX - {} - {}", function, err),
        }
        result
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn expect_echo(matches: bool) -> Result<(), RequestError> {
    if matches {
        Ok(())
    } else {
        Err(AduParseError::ReplyEchoMismatch.into())
    }
}

/// The (start, count) a compliant device echoes for a validated write batch
fn written_range(values: &[ModbusObject]) -> Result<AddressRange, RequestError> {
    let start = values
        .iter()
        .map(|x| x.address)
        .min()
        .ok_or(AduParseError::InsufficientBytes)?;
    // the batch was validated during serialization, so the length fits
    let count = values.len() as u16;
    Ok(AddressRange { start, count })
}

/// Turn values addressed relative to the request into absolute ones, dropping any extra values
/// that pad out the last byte of a bit response
fn to_absolute(
    mut values: Vec<ModbusObject>,
    start: u16,
    count: u16,
) -> Result<Vec<ModbusObject>, RequestError> {
    let count = count as usize;
    if values.len() < count {
        return Err(AduParseError::RequestByteCountMismatch(count, values.len()).into());
    }

    values.truncate(count);
    for value in values.iter_mut() {
        value.address = start.wrapping_add(value.address);
    }
    Ok(values)
}
